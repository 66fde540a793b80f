//! Database repository for the audit trail.

use crate::db::{
    errors::Result,
    models::audit_logs::{AuditEventCreateDBRequest, AuditEventDBResponse},
};
use crate::types::format_timestamp;
use sqlx::SqliteConnection;
use tracing::instrument;

pub struct AuditLogs<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> AuditLogs<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Append one event, returning its row id.
    #[instrument(skip(self, request), fields(event_type = %request.event_type), err)]
    pub async fn create(&mut self, request: &AuditEventCreateDBRequest) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO audit_logs (user_id, event_type, payload, ip, user_agent, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(request.user_id.as_deref())
        .bind(&request.event_type)
        .bind(&request.payload)
        .bind(&request.ip)
        .bind(&request.user_agent)
        .bind(format_timestamp(&request.created_at))
        .execute(&mut *self.db)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Events for one account, oldest first.
    pub async fn list_for_user(&mut self, user_id: &str) -> Result<Vec<AuditEventDBResponse>> {
        let events = sqlx::query_as::<_, AuditEventDBResponse>(
            "SELECT id, user_id, event_type, payload, ip, user_agent, created_at FROM audit_logs WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(events)
    }
}
