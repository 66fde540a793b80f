//! Best-effort audit trail entries.

use crate::db::errors::DbError;
use crate::db::handlers::AuditLogs;
use crate::db::models::audit_logs::AuditEventCreateDBRequest;
use crate::registration::tier::{Severity, Tier, run_step};
use crate::types::abbrev_id;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::instrument;

/// Value recorded when the client address or agent is not known.
pub const UNKNOWN: &str = "unknown";

/// Where a request came from, as far as the transport can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub ip: String,
    pub user_agent: String,
}

impl Default for RequestOrigin {
    fn default() -> Self {
        Self {
            ip: UNKNOWN.to_string(),
            user_agent: UNKNOWN.to_string(),
        }
    }
}

impl RequestOrigin {
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        let known = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            ip: known(ip).unwrap_or_else(|| UNKNOWN.to_string()),
            user_agent: known(user_agent).unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AuditRecorder;

impl AuditRecorder {
    /// Append an event. Failures are logged at error level and dropped.
    #[instrument(skip(self, db, payload, origin, timestamp), fields(user_id = %abbrev_id(user_id)))]
    pub async fn record<P: Serialize>(
        &self,
        db: &mut SqliteConnection,
        user_id: &str,
        event_type: &str,
        payload: &P,
        origin: &RequestOrigin,
        timestamp: &DateTime<Utc>,
    ) -> Option<i64> {
        run_step(Tier::BestEffort(Severity::Error), "record_audit_event", async move {
            let payload = serde_json::to_string(payload).map_err(|e| DbError::Other(e.into()))?;
            let request = AuditEventCreateDBRequest {
                user_id: Some(user_id.to_string()),
                event_type: event_type.to_string(),
                payload,
                ip: origin.ip.clone(),
                user_agent: origin.user_agent.clone(),
                created_at: *timestamp,
            };
            AuditLogs::new(db).create(&request).await
        })
        .await
        .ok()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::audit_logs::USER_REGISTERED;
    use crate::test_utils::apply_test_schema;
    use crate::types::now_millis;
    use serde_json::json;
    use sqlx::SqlitePool;

    #[test]
    fn test_origin_defaults_to_unknown() {
        let origin = RequestOrigin::new(None, Some("  ".to_string()));
        assert_eq!(origin, RequestOrigin::default());

        let origin = RequestOrigin::new(Some("203.0.113.9".to_string()), Some("curl/8.0".to_string()));
        assert_eq!(origin.ip, "203.0.113.9");
        assert_eq!(origin.user_agent, "curl/8.0");
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_payload_is_stored_as_json(pool: SqlitePool) {
        apply_test_schema(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let id = AuditRecorder
            .record(
                &mut conn,
                "u-1",
                USER_REGISTERED,
                &json!({"username": "olivia", "email": null}),
                &RequestOrigin::default(),
                &now_millis(),
            )
            .await;
        assert!(id.is_some());

        let events = AuditLogs::new(&mut conn).list_for_user("u-1").await.unwrap();
        let payload: serde_json::Value = serde_json::from_str(events[0].payload.as_deref().unwrap()).unwrap();
        assert_eq!(payload, json!({"username": "olivia", "email": null}));
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_missing_table_is_dropped(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let id = AuditRecorder
            .record(
                &mut conn,
                "u-1",
                USER_REGISTERED,
                &json!({}),
                &RequestOrigin::default(),
                &now_millis(),
            )
            .await;
        assert_eq!(id, None);
    }
}
