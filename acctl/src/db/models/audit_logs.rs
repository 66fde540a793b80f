//! Database models for the audit trail.

use crate::types::UserId;
use chrono::{DateTime, Utc};

/// Event type written when an account is created.
pub const USER_REGISTERED: &str = "user.registered";

/// Database request for appending an audit event
#[derive(Debug, Clone)]
pub struct AuditEventCreateDBRequest {
    pub user_id: Option<UserId>,
    pub event_type: String,
    /// Serialized JSON payload
    pub payload: String,
    pub ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEventDBResponse {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub event_type: String,
    pub payload: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
