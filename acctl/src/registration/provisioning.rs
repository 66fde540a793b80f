//! Best-effort creation of a new account's preference row.

use crate::config::PreferenceDefaults;
use crate::db::errors::{DbError, Result};
use crate::db::handlers::Preferences;
use crate::db::handlers::preferences::{PREFERENCE_SHAPES, PreferenceShape};
use crate::registration::tier::{Severity, Tier, run_step};
use crate::types::abbrev_id;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, instrument, warn};

pub struct PreferenceProvisioner<'a> {
    defaults: &'a PreferenceDefaults,
    shapes: &'a [PreferenceShape],
}

impl<'a> PreferenceProvisioner<'a> {
    pub fn new(defaults: &'a PreferenceDefaults) -> Self {
        Self {
            defaults,
            shapes: PREFERENCE_SHAPES,
        }
    }

    /// Write the preference row, returning the name of the shape that succeeded. Never fails: an
    /// account without preferences reads as defaults.
    #[instrument(skip(self, db, timestamp), fields(user_id = %abbrev_id(user_id)))]
    pub async fn provision(&self, db: &mut SqliteConnection, user_id: &str, timestamp: &DateTime<Utc>) -> Option<&'static str> {
        run_step(
            Tier::BestEffort(Severity::Warn),
            "provision_preferences",
            self.try_shapes(db, user_id, timestamp),
        )
        .await
        .ok()
        .flatten()
    }

    async fn try_shapes(&self, db: &mut SqliteConnection, user_id: &str, timestamp: &DateTime<Utc>) -> Result<&'static str> {
        let mut last_error = None;
        for (index, shape) in self.shapes.iter().enumerate() {
            match Preferences::new(&mut *db).create(shape, user_id, self.defaults, timestamp).await {
                Ok(()) => {
                    debug!(shape = shape.name, "Preferences created");
                    return Ok(shape.name);
                }
                Err(err) => {
                    let next = self.shapes.get(index + 1);
                    if !Self::should_advance(&err, next) {
                        return Err(err);
                    }
                    warn!(shape = shape.name, error = %err, "Preference shape rejected by schema, trying a smaller one");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| DbError::Other(anyhow::anyhow!("no preference shapes configured"))))
    }

    /// Advance only past a missing column that the next shape leaves out.
    fn should_advance(err: &DbError, next: Option<&PreferenceShape>) -> bool {
        match (err, next) {
            (DbError::NoSuchColumn { column: Some(column), .. }, Some(next)) => !next.includes(column),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::preferences::BASIC_SHAPE;
    use crate::test_utils::{apply_test_schema, apply_test_schema_through, insert_bare_user};
    use crate::types::now_millis;
    use sqlx::SqlitePool;

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_current_schema_uses_full_shape(pool: SqlitePool) {
        apply_test_schema(&pool).await;
        insert_bare_user(&pool, "u-1", "leo").await;
        let mut conn = pool.acquire().await.unwrap();

        let defaults = PreferenceDefaults::default();
        let shape = PreferenceProvisioner::new(&defaults)
            .provision(&mut conn, "u-1", &now_millis())
            .await;
        assert_eq!(shape, Some("full"));
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_old_schema_falls_back_to_basic_shape(pool: SqlitePool) {
        apply_test_schema_through(&pool, 1).await;
        insert_bare_user(&pool, "u-1", "mia").await;
        let mut conn = pool.acquire().await.unwrap();

        let defaults = PreferenceDefaults::default();
        let shape = PreferenceProvisioner::new(&defaults)
            .provision(&mut conn, "u-1", &now_millis())
            .await;
        assert_eq!(shape, Some("basic"));

        let theme: String = sqlx::query_scalar("SELECT theme FROM user_preferences WHERE user_id = 'u-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(theme, "light");
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_other_failures_do_not_advance(pool: SqlitePool) {
        apply_test_schema(&pool).await;
        insert_bare_user(&pool, "u-1", "noah").await;
        let mut conn = pool.acquire().await.unwrap();
        let defaults = PreferenceDefaults::default();
        let provisioner = PreferenceProvisioner::new(&defaults);

        assert_eq!(provisioner.provision(&mut conn, "u-1", &now_millis()).await, Some("full"));
        // Second row for the same account violates the primary key; the basic shape is not tried.
        assert_eq!(provisioner.provision(&mut conn, "u-1", &now_millis()).await, None);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_missing_table_is_swallowed(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let defaults = PreferenceDefaults::default();
        assert_eq!(
            PreferenceProvisioner::new(&defaults)
                .provision(&mut conn, "u-1", &now_millis())
                .await,
            None
        );
    }

    #[test]
    fn test_advance_rule() {
        let missing_tag_layout = DbError::from_message("table user_preferences has no column named tag_layout").unwrap();
        let missing_theme = DbError::from_message("table user_preferences has no column named theme").unwrap();
        assert!(PreferenceProvisioner::should_advance(&missing_tag_layout, Some(&BASIC_SHAPE)));
        assert!(!PreferenceProvisioner::should_advance(&missing_theme, Some(&BASIC_SHAPE)));
        assert!(!PreferenceProvisioner::should_advance(&missing_tag_layout, None));
    }
}
