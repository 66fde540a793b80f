use crate::db::errors::DbError;
use crate::types::ConflictField;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request rejected before touching the store
    #[error("{message}")]
    InvalidInput { message: String },

    /// Username or email already belongs to another account
    #[error("Conflict on {field}")]
    Conflict { field: ConflictField },

    /// The store could not be reached at all
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String, remediation: String },

    /// The store is reachable but a table or column the write path needs is absent
    #[error("Schema object missing: {object}")]
    SchemaMissing { object: String, remediation: String },

    /// Password digesting failed
    #[error("Failed to process credential: {reason}")]
    CredentialProcessingFailed { reason: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Store operation error
    #[error(transparent)]
    Store(#[from] DbError),
}

/// Wire name of an error, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Conflict,
    StoreUnavailable,
    SchemaMissing,
    CredentialProcessingFailed,
    StoreError,
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<ConflictField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput { .. } => ErrorKind::InvalidInput,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Error::SchemaMissing { .. } => ErrorKind::SchemaMissing,
            Error::CredentialProcessingFailed { .. } => ErrorKind::CredentialProcessingFailed,
            Error::Store(DbError::Unavailable(_)) => ErrorKind::StoreUnavailable,
            Error::Store(db_err) if db_err.is_schema_drift() => ErrorKind::SchemaMissing,
            Error::Internal { .. } | Error::Store(_) => ErrorKind::StoreError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::StoreUnavailable | ErrorKind::SchemaMissing => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::CredentialProcessingFailed | ErrorKind::StoreError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidInput { message } => message.clone(),
            Error::Conflict { field } => match field {
                ConflictField::Username => "This username is already taken".to_string(),
                ConflictField::Email => "An account with this email address already exists".to_string(),
            },
            Error::StoreUnavailable { .. } | Error::Store(DbError::Unavailable(_)) => {
                "The account store is temporarily unavailable".to_string()
            }
            Error::SchemaMissing { object, .. } => {
                format!("The account store is not initialized ({object} is missing)")
            }
            Error::Store(db_err) if db_err.is_schema_drift() => "The account store is not initialized".to_string(),
            Error::CredentialProcessingFailed { .. } => "Could not process the password, please retry".to_string(),
            Error::Internal { .. } | Error::Store(_) => "Internal server error".to_string(),
        }
    }

    pub fn field(&self) -> Option<ConflictField> {
        match self {
            Error::Conflict { field } => Some(*field),
            _ => None,
        }
    }

    pub fn remediation(&self) -> Option<&str> {
        match self {
            Error::StoreUnavailable { remediation, .. } | Error::SchemaMissing { remediation, .. } => Some(remediation),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error_kind: self.kind(),
            message: self.user_message(),
            field: self.field(),
            remediation: self.remediation().map(str::to_string),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match self.kind() {
            ErrorKind::StoreError | ErrorKind::CredentialProcessingFailed => {
                tracing::error!("Internal service error: {:#}", self);
            }
            ErrorKind::StoreUnavailable | ErrorKind::SchemaMissing => {
                tracing::error!(remediation = ?self.remediation(), "Store not ready: {}", self);
            }
            ErrorKind::Conflict => {
                tracing::warn!("Conflict error: {}", self);
            }
            ErrorKind::InvalidInput => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), axum::response::Json(self.to_body())).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_kind() {
        let cases = [
            (Error::InvalidInput { message: "x".into() }, StatusCode::BAD_REQUEST),
            (
                Error::Conflict {
                    field: ConflictField::Email,
                },
                StatusCode::CONFLICT,
            ),
            (
                Error::SchemaMissing {
                    object: "users".into(),
                    remediation: "run it".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::Store(DbError::Unavailable("closed".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::CredentialProcessingFailed { reason: "boom".into() },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::Store(DbError::Other(anyhow::anyhow!("disk I/O error"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err:?}");
        }
    }

    #[test]
    fn test_user_message_hides_store_details() {
        let err = Error::Store(DbError::Other(anyhow::anyhow!("near \"INSRT\": syntax error in users")));
        assert_eq!(err.user_message(), "Internal server error");

        let err = Error::CredentialProcessingFailed {
            reason: "argon2 params invalid".into(),
        };
        assert!(!err.user_message().contains("argon2"));
    }

    #[test]
    fn test_body_carries_field_and_remediation() {
        let body = Error::Conflict {
            field: ConflictField::Username,
        }
        .to_body();
        assert_eq!(body.error_kind, ErrorKind::Conflict);
        assert_eq!(body.field, Some(ConflictField::Username));
        assert!(body.remediation.is_none());

        let body = Error::StoreUnavailable {
            reason: "unable to open database file".into(),
            remediation: "Run `acctl db migrate`".into(),
        }
        .to_body();
        assert_eq!(body.error_kind, ErrorKind::StoreUnavailable);
        assert_eq!(body.remediation.as_deref(), Some("Run `acctl db migrate`"));

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("field").is_none());
        assert_eq!(json["error_kind"], "store_unavailable");
    }
}
