//! Schema readiness checks against a live pool.
//!
//! [`SchemaProbe`] separates two situations that need different operator action:
//!
//! - the connection layer itself is broken (no file, file is not a database, pool exhausted),
//!   reported as [`Readiness::Unavailable`];
//! - the connection works but a table the application relies on is absent (migrations never ran
//!   against this file), reported as [`Readiness::Missing`].

use crate::db::errors::{DbError, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, instrument, warn};

/// Table-name prefixes that belong to SQLite or to tooling, never to the application schema.
const INTERNAL_TABLE_PREFIXES: &[&str] = &["sqlite_", "_cf_", "_sqlx_"];

/// Outcome of a readiness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Unavailable { reason: String },
    Missing { object: String },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Column description from `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ColumnInfo {
    pub name: String,
    #[sqlx(rename = "type")]
    pub data_type: String,
    #[sqlx(rename = "notnull")]
    pub not_null: bool,
    #[sqlx(rename = "pk")]
    pub primary_key_position: i64,
}

pub struct SchemaProbe<'p> {
    db: &'p SqlitePool,
    required_tables: &'p [String],
}

impl<'p> SchemaProbe<'p> {
    pub fn new(db: &'p SqlitePool, required_tables: &'p [String]) -> Self {
        Self { db, required_tables }
    }

    /// Check that the store answers at all, then that every required table is present.
    #[instrument(skip(self), fields(required = self.required_tables.len()))]
    pub async fn check_ready(&self) -> Readiness {
        match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_optional(self.db).await {
            Ok(Some(1)) => debug!("Store connectivity check passed"),
            Ok(_) => {
                warn!("Store connectivity check returned no result");
                return Readiness::Unavailable {
                    reason: "connectivity check returned no result".to_string(),
                };
            }
            Err(e) => return Self::classify_failure(e.into()),
        }

        for table in self.required_tables {
            match self.table_exists(table).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(table = %table, "Required table not found");
                    return Readiness::Missing { object: table.clone() };
                }
                Err(e) => return Self::classify_failure(e),
            }
        }

        Readiness::Ready
    }

    fn classify_failure(err: DbError) -> Readiness {
        warn!(error = %err, "Store readiness check failed");
        match err {
            DbError::NoSuchTable { table, .. } => Readiness::Missing {
                object: table.unwrap_or_else(|| "<unknown table>".to_string()),
            },
            DbError::NoSuchColumn { column, .. } => Readiness::Missing {
                object: column.unwrap_or_else(|| "<unknown column>".to_string()),
            },
            DbError::Unavailable(reason) => Readiness::Unavailable { reason },
            other => Readiness::Unavailable { reason: other.to_string() },
        }
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(self.db)
            .await?;
        Ok(found.is_some())
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self.table_columns(table).await?.iter().any(|c| c.name.eq_ignore_ascii_case(column)))
    }

    /// Application tables, sorted by name, with internal tables filtered out.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(self.db)
            .await?;
        Ok(names.into_iter().filter(|name| !is_internal_table(name)).collect())
    }

    /// Columns of `table`; empty when the table does not exist.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let columns = sqlx::query_as::<_, ColumnInfo>("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(self.db)
            .await?;
        Ok(columns)
    }
}

pub fn is_internal_table(name: &str) -> bool {
    INTERNAL_TABLE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}
