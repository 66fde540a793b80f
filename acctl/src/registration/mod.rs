//! The account registration write protocol.
//!
//! [`Registrar::register`] runs these steps in order:
//!
//! | step | tier | failure |
//! |------|------|---------|
//! | validate input | strict | `InvalidInput` |
//! | schema preflight | strict | `StoreUnavailable` / `SchemaMissing` |
//! | username/email pre-check | strict | `Conflict` |
//! | hash password | strict | `CredentialProcessingFailed` |
//! | insert account | strict | `Conflict` / `StoreError` |
//! | create preferences | best effort | logged at warn |
//! | audit event | best effort | logged at error |
//!
//! The store's unique constraints are the only authority on uniqueness. The pre-check exists to
//! give a precise error in the common case, and a constraint violation on insert is traced back to
//! the colliding field by [`conflicts::ConflictResolver`].

pub mod audit;
pub mod conflicts;
pub mod provisioning;
pub mod tier;
pub mod validation;

use crate::auth::ids::{IdGenerator, UuidV4Generator};
use crate::auth::password::{Argon2Hasher, CredentialHasher};
use crate::config::{Config, RegistrationConfig, RemediationConfig};
use crate::db::errors::DbError;
use crate::db::handlers::Users;
use crate::db::models::audit_logs::USER_REGISTERED;
use crate::db::models::users::UserCreateDBRequest;
use crate::db::probe::{Readiness, SchemaProbe};
use crate::errors::{Error, Result};
use crate::types::{ConflictField, UserId, abbrev_id, now_millis, serialize_timestamp};
use audit::{AuditRecorder, RequestOrigin};
use bon::Builder;
use chrono::{DateTime, Utc};
use conflicts::ConflictResolver;
use provisioning::PreferenceProvisioner;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool};
use std::sync::Arc;
use tier::{Tier, run_step};
use tracing::{info, instrument};
use validation::ValidatedRegistration;

/// Raw registration input.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

/// A created account. Never carries the password digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Payload of the `user.registered` audit event.
#[derive(Debug, Serialize)]
struct RegisteredEvent<'a> {
    username: &'a str,
    email: Option<&'a str>,
}

#[derive(Clone, Builder)]
pub struct Registrar {
    db: SqlitePool,
    config: RegistrationConfig,
    remediation: RemediationConfig,
    required_tables: Vec<String>,
    hasher: Arc<dyn CredentialHasher>,
    ids: Arc<dyn IdGenerator>,
}

impl Registrar {
    /// Registrar with the Argon2id hasher and UUID v4 ids.
    pub fn from_config(db: SqlitePool, config: &Config) -> Self {
        Registrar::builder()
            .db(db)
            .config(config.registration.clone())
            .remediation(config.remediation.clone())
            .required_tables(config.database.required_tables.clone())
            .hasher(Arc::new(Argon2Hasher::new(config.registration.password.argon2_params())))
            .ids(Arc::new(UuidV4Generator))
            .build()
    }

    pub fn registration_enabled(&self) -> bool {
        self.config.enabled
    }

    #[instrument(skip_all, fields(username = %request.username, user_id = tracing::field::Empty))]
    pub async fn register(&self, request: RegistrationRequest, origin: &RequestOrigin) -> Result<Account> {
        let input = validation::validate(&request.username, &request.password, request.email.as_deref(), &self.config)?;

        run_step(Tier::Strict, "preflight", self.preflight()).await?;

        run_step(Tier::Strict, "precheck_conflicts", async {
            let mut conn = self.acquire().await?;
            let found = ConflictResolver::new(&mut conn)
                .which_field_conflicts(&input.username, input.email.as_deref())
                .await
                .map_err(|e| self.classify(e))?;
            match found {
                Some(field) => Err(Error::Conflict { field }),
                None => Ok(()),
            }
        })
        .await?;

        // No pooled connection is held while hashing
        let password_hash = self.hash_password(&input).await?;
        let request = UserCreateDBRequest {
            id: self.ids.new_id(),
            username: input.username.clone(),
            email: input.email.clone(),
            password_hash,
            created_at: now_millis(),
        };
        tracing::Span::current().record("user_id", abbrev_id(&request.id).as_str());

        let mut conn = self.acquire().await?;
        let created = match Users::new(&mut conn).create(&request).await {
            Ok(created) => created,
            Err(violation @ DbError::UniqueViolation { .. }) => {
                let field = ConflictResolver::new(&mut conn)
                    .resolve_violation(&violation, &input.username, input.email.as_deref())
                    .await;
                return Err(violation_error(field, violation));
            }
            Err(e) => return Err(self.classify(e)),
        };

        PreferenceProvisioner::new(&self.config.preferences)
            .provision(&mut conn, &created.id, &created.created_at)
            .await;

        let event = RegisteredEvent {
            username: &created.username,
            email: created.email.as_deref(),
        };
        AuditRecorder
            .record(&mut conn, &created.id, USER_REGISTERED, &event, origin, &created.created_at)
            .await;

        info!(user_id = %abbrev_id(&created.id), "Account registered");
        Ok(Account {
            id: created.id,
            username: created.username,
            email: created.email,
            created_at: created.created_at,
        })
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.db.acquire().await.map_err(|e| self.classify(e.into()))
    }

    async fn preflight(&self) -> Result<()> {
        match SchemaProbe::new(&self.db, &self.required_tables).check_ready().await {
            Readiness::Ready => Ok(()),
            Readiness::Unavailable { reason } => Err(Error::StoreUnavailable {
                reason,
                remediation: self.remediation.for_unavailable(),
            }),
            Readiness::Missing { object } => Err(self.schema_missing(object)),
        }
    }

    async fn hash_password(&self, input: &ValidatedRegistration) -> Result<String> {
        let hasher = Arc::clone(&self.hasher);
        let password = input.password.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| Error::CredentialProcessingFailed {
                reason: format!("spawn password hashing task: {e}"),
            })?
            .map_err(|e| match e {
                Error::CredentialProcessingFailed { .. } => e,
                other => Error::CredentialProcessingFailed { reason: other.to_string() },
            })
    }

    fn schema_missing(&self, object: String) -> Error {
        Error::SchemaMissing {
            remediation: self.remediation.for_missing(&object),
            object,
        }
    }

    /// Map a store failure on the strict path to the API taxonomy.
    fn classify(&self, err: DbError) -> Error {
        match err {
            DbError::NoSuchTable { table, .. } => self.schema_missing(table.unwrap_or_else(|| "users".to_string())),
            DbError::NoSuchColumn { column, .. } => self.schema_missing(column.unwrap_or_else(|| "users".to_string())),
            DbError::Unavailable(reason) => Error::StoreUnavailable {
                reason,
                remediation: self.remediation.for_unavailable(),
            },
            other => Error::Store(other),
        }
    }
}

/// Error for a uniqueness violation on insert. A violation that neither the re-query nor the
/// constraint column attributes to a field is a `StoreError` (500), not a generic 409: the store
/// rejected the row for a reason this path cannot name.
fn violation_error(field: Option<ConflictField>, violation: DbError) -> Error {
    match field {
        Some(field) => Error::Conflict { field },
        None => Error::Store(violation),
    }
}
