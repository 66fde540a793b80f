//! API request/response models for registration.

use crate::registration::{Account, RegistrationRequest};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Missing and `null` fields deserialize to `None` so that validation, not the JSON extractor,
/// rejects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<RegisterRequest> for RegistrationRequest {
    fn from(request: RegisterRequest) -> Self {
        RegistrationRequest {
            username: request.username.unwrap_or_default(),
            password: request.password.unwrap_or_default(),
            email: request.email,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub user: Account,
    pub message: String,
}

impl IntoResponse for RegisterResponse {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub enabled: bool,
    pub message: String,
}
