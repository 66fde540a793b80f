//! Pool construction for a resolved database file.
//!
//! Every pool in the crate is opened from a [`PhysicalDatabaseFile`] so that the file a process
//! talks to is always the one the identity resolver picked.

use crate::config::{DatabaseConfig, PoolSettings};
use crate::db::errors::{DbError, Result};
use crate::devdb::identity::PhysicalDatabaseFile;
use log::LevelFilter;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::time::Duration;
use tracing::debug;

/// Whether opening a pool may create the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// The file must already exist. Used by the service so a wrong path surfaces as unavailable
    /// instead of silently creating an empty database.
    Existing,
    /// Create the file if needed. Used by the migration applier.
    Create,
}

/// Connection options for one database file.
pub fn connect_options(file: &PhysicalDatabaseFile, config: &DatabaseConfig, slow_statement_threshold: Duration, mode: OpenMode) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(&file.path)
        .create_if_missing(mode == OpenMode::Create)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.busy_timeout)
        .log_slow_statements(LevelFilter::Warn, slow_statement_threshold)
}

fn pool_options(settings: &PoolSettings) -> SqlitePoolOptions {
    let options = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));
    if settings.idle_timeout_secs > 0 {
        options.idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
    } else {
        options.idle_timeout(None)
    }
}

/// Pool that connects on first use. Failures to open the file show up as
/// [`DbError::Unavailable`] on the first query rather than at startup.
pub fn connect_lazy(file: &PhysicalDatabaseFile, config: &DatabaseConfig, slow_statement_threshold: Duration) -> SqlitePool {
    debug!(path = %file.path.display(), profile = %file.profile, "Opening lazy pool");
    pool_options(&config.pool).connect_lazy_with(connect_options(file, config, slow_statement_threshold, OpenMode::Existing))
}

/// Pool that has connected at least once.
pub async fn connect(
    file: &PhysicalDatabaseFile,
    config: &DatabaseConfig,
    slow_statement_threshold: Duration,
    mode: OpenMode,
) -> Result<SqlitePool> {
    debug!(path = %file.path.display(), profile = %file.profile, ?mode, "Opening pool");
    if mode == OpenMode::Create {
        if let Some(parent) = file.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DbError::Unavailable(format!("create {}: {e}", parent.display())))?;
        }
    }
    pool_options(&config.pool)
        .connect_with(connect_options(file, config, slow_statement_threshold, mode))
        .await
        .map_err(DbError::from)
}
