//! Comparing the schema seen through the service path with the one seen through the admin path.

use crate::db::probe::SchemaProbe;
use crate::devdb::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::instrument;

/// Table-level differences between the two paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DivergenceReport {
    pub live_tables: Vec<String>,
    pub admin_tables: Vec<String>,
    /// Visible to admin commands but not to the service: they are writing to different files
    pub split_database: Vec<String>,
    /// Visible to the service but not to admin commands
    pub missing_on_admin: Vec<String>,
    /// Expected tables that neither path can see
    pub never_migrated: Vec<String>,
}

impl DivergenceReport {
    pub fn is_consistent(&self) -> bool {
        self.split_database.is_empty() && self.missing_on_admin.is_empty() && self.never_migrated.is_empty()
    }

    /// Build a report from the two table lists.
    pub fn compare(live_tables: Vec<String>, admin_tables: Vec<String>, expected_tables: &[String]) -> Self {
        let live: BTreeSet<&str> = live_tables.iter().map(String::as_str).collect();
        let admin: BTreeSet<&str> = admin_tables.iter().map(String::as_str).collect();

        let split_database = admin.difference(&live).map(|t| t.to_string()).collect();
        let missing_on_admin = live.difference(&admin).map(|t| t.to_string()).collect();
        let never_migrated = expected_tables
            .iter()
            .filter(|t| !live.contains(t.as_str()) && !admin.contains(t.as_str()))
            .cloned()
            .collect();

        Self {
            live_tables,
            admin_tables,
            split_database,
            missing_on_admin,
            never_migrated,
        }
    }
}

pub struct ConsistencyVerifier<'a> {
    expected_tables: &'a [String],
}

impl<'a> ConsistencyVerifier<'a> {
    pub fn new(expected_tables: &'a [String]) -> Self {
        Self { expected_tables }
    }

    /// Diff two live pools. `None` stands for a path whose file does not exist yet and therefore
    /// has no tables.
    #[instrument(skip_all)]
    pub async fn diff(&self, live: Option<&SqlitePool>, admin: Option<&SqlitePool>) -> Result<DivergenceReport> {
        let live_tables = self.tables(live).await?;
        let admin_tables = self.tables(admin).await?;
        Ok(DivergenceReport::compare(live_tables, admin_tables, self.expected_tables))
    }

    async fn tables(&self, db: Option<&SqlitePool>) -> Result<Vec<String>> {
        match db {
            Some(db) => Ok(SchemaProbe::new(db, self.expected_tables).list_tables().await?),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{apply_test_schema, required_tables};
    use sqlx::sqlite::SqlitePoolOptions;

    fn all_tables() -> Vec<String> {
        vec!["audit_logs".to_string(), "user_preferences".to_string(), "users".to_string()]
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_same_file_has_no_divergence(pool: SqlitePool) {
        apply_test_schema(&pool).await;
        let expected = required_tables();

        let report = ConsistencyVerifier::new(&expected)
            .diff(Some(&pool), Some(&pool))
            .await
            .unwrap();
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.live_tables, all_tables());
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_unmigrated_admin_file_lists_missing_tables(pool: SqlitePool) {
        apply_test_schema(&pool).await;
        let admin = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let expected = required_tables();
        let verifier = ConsistencyVerifier::new(&expected);

        let report = verifier.diff(Some(&pool), Some(&admin)).await.unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.missing_on_admin, all_tables());
        assert!(report.split_database.is_empty());
        assert!(report.never_migrated.is_empty());

        // Migrations applied through the admin path only: the service cannot see them
        let report = verifier.diff(Some(&admin), Some(&pool)).await.unwrap();
        assert_eq!(report.split_database, all_tables());
        assert!(report.missing_on_admin.is_empty());
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_nothing_migrated_anywhere(pool: SqlitePool) {
        let expected = required_tables();
        let report = ConsistencyVerifier::new(&expected)
            .diff(Some(&pool), None)
            .await
            .unwrap();
        assert_eq!(report.never_migrated, vec!["users".to_string()]);
        assert!(report.split_database.is_empty());
    }

    #[test]
    fn test_compare_ignores_order() {
        let report = DivergenceReport::compare(
            vec!["b".to_string(), "a".to_string()],
            vec!["a".to_string(), "b".to_string()],
            &["a".to_string()],
        );
        assert!(report.is_consistent());
    }
}
