//! Database models for users.

use crate::types::UserId;
use chrono::{DateTime, Utc};

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    /// Written to both `created_at` and `updated_at`
    pub created_at: DateTime<Utc>,
}

/// Database response for user operations. Never carries the password digest.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
