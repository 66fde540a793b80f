//! Idempotent application of migration files.
//!
//! SQLite DDL gives no way to ask "has this migration run?" short of a bookkeeping table, and the
//! dev server's own tooling may already have applied some files. Instead every statement is
//! applied on its own, and a store error saying the object is already there counts as success.
//! Which errors mean "already there" is decided by [`DbError::is_already_applied`], so new
//! migration files need no special handling.
//!
//! Files are named `NNNN_description.sql`; anything else in the directory is ignored.

use crate::db::errors::DbError;
use crate::db::probe::{Readiness, SchemaProbe};
use crate::devdb::sql::{has_content, split_statements};
use crate::devdb::{DevDbError, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

const SEQUENCE_DIGITS: usize = 4;

/// One migration script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub sequence: u32,
    pub name: String,
    pub sql: String,
}

impl MigrationFile {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let sequence = parse_sequence(&name)?;
        Some(Self {
            sequence,
            name,
            sql: sql.into(),
        })
    }
}

/// Sequence number of a `NNNN_description.sql` file name.
pub fn parse_sequence(file_name: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(".sql")?;
    let digits = stem.get(..SEQUENCE_DIGITS)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) || stem.as_bytes().get(SEQUENCE_DIGITS) != Some(&b'_') {
        return None;
    }
    digits.parse().ok()
}

fn sorted(mut files: Vec<MigrationFile>) -> Vec<MigrationFile> {
    files.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.name.cmp(&b.name)));
    files
}

/// Migrations compiled into the binary.
pub fn bundled_migrations() -> Vec<MigrationFile> {
    let files = [
        ("0001_initial_schema.sql", include_str!("../../migrations/0001_initial_schema.sql")),
        ("0002_preferences_tag_layout.sql", include_str!("../../migrations/0002_preferences_tag_layout.sql")),
        ("0003_preferences_sort_by.sql", include_str!("../../migrations/0003_preferences_sort_by.sql")),
        ("0004_users_updated_at_trigger.sql", include_str!("../../migrations/0004_users_updated_at_trigger.sql")),
    ];
    sorted(files.into_iter().filter_map(|(name, sql)| MigrationFile::new(name, sql)).collect())
}

/// Migrations from a directory, ordered by sequence.
pub fn load_migrations(dir: &Path) -> Result<Vec<MigrationFile>> {
    let io_err = |source| DevDbError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if parse_sequence(&name).is_none() || !path.is_file() {
            debug!(file = %name, "Ignoring non-migration file");
            continue;
        }
        let sql = std::fs::read_to_string(&path).map_err(|source| DevDbError::Io { path: path.clone(), source })?;
        files.extend(MigrationFile::new(name, sql));
    }
    Ok(sorted(files))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatementOutcome {
    Applied,
    AlreadyApplied { message: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementReport {
    /// First line of the statement, for display
    pub summary: String,
    pub outcome: StatementOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Only comments
    Skipped,
    /// At least one statement changed the schema, none failed
    Applied,
    /// Every statement was already applied
    AlreadyApplied,
    /// At least one statement failed
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: String,
    pub status: FileStatus,
    pub statements: Vec<StatementReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Nothing was applied because the expected tables were already present
    pub skipped: bool,
    pub files: Vec<FileReport>,
    pub readiness: Readiness,
    pub missing_tables: Vec<String>,
}

impl MigrationReport {
    /// Every expected table exists after the run.
    pub fn succeeded(&self) -> bool {
        self.readiness.is_ready() && self.missing_tables.is_empty()
    }

    pub fn failed_statements(&self) -> impl Iterator<Item = (&str, &StatementReport)> {
        self.files.iter().flat_map(|file| {
            file.statements
                .iter()
                .filter(|s| matches!(s.outcome, StatementOutcome::Failed { .. }))
                .map(move |s| (file.name.as_str(), s))
        })
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    Always,
    /// Skip everything when the expected tables already exist
    IfMissing,
}

pub struct MigrationApplier<'a> {
    expected_tables: &'a [String],
}

impl<'a> MigrationApplier<'a> {
    pub fn new(expected_tables: &'a [String]) -> Self {
        Self { expected_tables }
    }

    pub async fn apply(&self, mode: MigrationMode, migrations: &[MigrationFile], db: &SqlitePool) -> MigrationReport {
        if mode == MigrationMode::IfMissing {
            let (readiness, missing_tables) = self.verify(db).await;
            if readiness.is_ready() && missing_tables.is_empty() {
                info!("Expected tables present, skipping migrations");
                return MigrationReport {
                    skipped: true,
                    files: Vec::new(),
                    readiness,
                    missing_tables,
                };
            }
        }
        self.apply_all(migrations, db).await
    }

    /// Apply every file in order, then probe for the expected tables.
    #[instrument(skip_all, fields(files = migrations.len()))]
    pub async fn apply_all(&self, migrations: &[MigrationFile], db: &SqlitePool) -> MigrationReport {
        let mut files = Vec::with_capacity(migrations.len());
        for migration in migrations {
            files.push(self.apply_file(migration, db).await);
        }

        let (readiness, missing_tables) = self.verify(db).await;
        let report = MigrationReport {
            skipped: false,
            files,
            readiness,
            missing_tables,
        };
        info!(
            applied = report.count(FileStatus::Applied),
            already_applied = report.count(FileStatus::AlreadyApplied),
            failed = report.count(FileStatus::Failed),
            succeeded = report.succeeded(),
            "Migration run finished"
        );
        report
    }

    async fn apply_file(&self, migration: &MigrationFile, db: &SqlitePool) -> FileReport {
        if !has_content(&migration.sql) {
            debug!(file = %migration.name, "Skipping comment-only migration");
            return FileReport {
                name: migration.name.clone(),
                status: FileStatus::Skipped,
                statements: Vec::new(),
            };
        }

        let mut statements = Vec::new();
        for statement in split_statements(&migration.sql) {
            let outcome = match sqlx::raw_sql(&statement).execute(db).await {
                Ok(_) => StatementOutcome::Applied,
                Err(e) => match DbError::from(e) {
                    err if err.is_already_applied() => StatementOutcome::AlreadyApplied { message: err.to_string() },
                    err => {
                        warn!(file = %migration.name, error = %err, "Migration statement failed");
                        StatementOutcome::Failed {
                            error: failure_detail(&err),
                        }
                    }
                },
            };
            statements.push(StatementReport {
                summary: summarize(&statement),
                outcome,
            });
        }

        let status = if statements.iter().any(|s| matches!(s.outcome, StatementOutcome::Failed { .. })) {
            FileStatus::Failed
        } else if statements.iter().any(|s| s.outcome == StatementOutcome::Applied) {
            FileStatus::Applied
        } else {
            FileStatus::AlreadyApplied
        };
        debug!(file = %migration.name, ?status, "Migration file processed");

        FileReport {
            name: migration.name.clone(),
            status,
            statements,
        }
    }

    async fn verify(&self, db: &SqlitePool) -> (Readiness, Vec<String>) {
        let probe = SchemaProbe::new(db, self.expected_tables);
        let readiness = probe.check_ready().await;
        let mut missing = Vec::new();
        for table in self.expected_tables {
            match probe.table_exists(table).await {
                Ok(true) => {}
                Ok(false) | Err(_) => missing.push(table.clone()),
            }
        }
        (readiness, missing)
    }
}

/// Raw store message where there is one, so operators see what SQLite said.
fn failure_detail(err: &DbError) -> String {
    match err {
        DbError::UniqueViolation { message, .. }
        | DbError::NoSuchTable { message, .. }
        | DbError::NoSuchColumn { message, .. }
        | DbError::AlreadyExists { message }
        | DbError::DuplicateColumn { message, .. } => message.clone(),
        DbError::Unavailable(reason) => reason.clone(),
        DbError::Other(e) => format!("{e:#}"),
    }
}

fn summarize(statement: &str) -> String {
    statement
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("--"))
        .unwrap_or_default()
        .chars()
        .take(80)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::required_tables;

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("0001_initial_schema.sql"), Some(1));
        assert_eq!(parse_sequence("0042_x.sql"), Some(42));
        assert_eq!(parse_sequence("001_short.sql"), None);
        assert_eq!(parse_sequence("0001-dash.sql"), None);
        assert_eq!(parse_sequence("0001_notes.txt"), None);
        assert_eq!(parse_sequence("README.md"), None);
    }

    #[test]
    fn test_bundled_migrations_are_ordered() {
        let names: Vec<u32> = bundled_migrations().iter().map(|m| m.sequence).collect();
        assert_eq!(names, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_load_migrations_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0002_second.sql"), "CREATE TABLE b (id INTEGER);").unwrap();
        std::fs::write(dir.path().join("0001_first.sql"), "CREATE TABLE a (id INTEGER);").unwrap();
        std::fs::write(dir.path().join("README.md"), "# not a migration").unwrap();
        std::fs::write(dir.path().join("seed.sql"), "INSERT INTO a VALUES (1);").unwrap();

        let files = load_migrations(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["0001_first.sql", "0002_second.sql"]);
    }

    #[test]
    fn test_load_migrations_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_migrations(&dir.path().join("nope")),
            Err(DevDbError::Io { .. })
        ));
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_apply_twice_is_idempotent(pool: SqlitePool) {
        let expected = required_tables();
        let applier = MigrationApplier::new(&expected);
        let migrations = bundled_migrations();

        let first = applier.apply_all(&migrations, &pool).await;
        assert!(first.succeeded());
        assert_eq!(first.count(FileStatus::Applied), 4);
        assert_eq!(first.failed_statements().count(), 0);

        let second = applier.apply_all(&migrations, &pool).await;
        assert!(second.succeeded());
        assert_eq!(second.count(FileStatus::AlreadyApplied), 4);
        assert_eq!(second.failed_statements().count(), 0);

        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('user_preferences')")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(columns.iter().filter(|c| *c == "sort_by").count(), 1);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_partially_applied_file_completes(pool: SqlitePool) {
        // Only the first table of 0001 exists, as if an earlier run stopped midway
        sqlx::query(
            "CREATE TABLE users (id TEXT PRIMARY KEY, username TEXT NOT NULL UNIQUE COLLATE NOCASE, email TEXT UNIQUE COLLATE NOCASE, password_hash TEXT NOT NULL, created_at TEXT NOT NULL, updated_at TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let expected = vec!["users".to_string(), "audit_logs".to_string()];
        let report = MigrationApplier::new(&expected).apply_all(&bundled_migrations(), &pool).await;

        assert!(report.succeeded());
        let first = &report.files[0];
        assert_eq!(first.status, FileStatus::Applied);
        assert!(matches!(first.statements[0].outcome, StatementOutcome::AlreadyApplied { .. }));
        assert_eq!(first.statements[1].outcome, StatementOutcome::Applied);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_failures_are_recorded_and_application_continues(pool: SqlitePool) {
        let migrations = vec![
            MigrationFile::new("0001_broken.sql", "CREATE TABLE ok_one (id INTEGER);\nCREAT TABLE typo (id INTEGER);\nCREATE TABLE ok_two (id INTEGER);").unwrap(),
            MigrationFile::new("0002_comments.sql", "-- nothing yet\n").unwrap(),
        ];
        let expected = vec!["ok_one".to_string(), "ok_two".to_string(), "users".to_string()];
        let report = MigrationApplier::new(&expected).apply_all(&migrations, &pool).await;

        assert_eq!(report.files[0].status, FileStatus::Failed);
        assert_eq!(report.files[0].statements.len(), 3);
        assert_eq!(report.files[0].statements[2].outcome, StatementOutcome::Applied);
        assert_eq!(report.files[1].status, FileStatus::Skipped);
        assert_eq!(report.failed_statements().count(), 1);
        assert_eq!(report.missing_tables, vec!["users".to_string()]);
        assert!(!report.succeeded());
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_if_missing_skips_migrated_database(pool: SqlitePool) {
        let expected = required_tables();
        let applier = MigrationApplier::new(&expected);

        let report = applier.apply(MigrationMode::IfMissing, &bundled_migrations(), &pool).await;
        assert!(!report.skipped);
        assert!(report.succeeded());

        let report = applier.apply(MigrationMode::IfMissing, &bundled_migrations(), &pool).await;
        assert!(report.skipped);
        assert!(report.files.is_empty());
    }

    #[test]
    fn test_summarize_skips_comments() {
        assert_eq!(
            summarize("-- header\n\nCREATE TABLE users (\n  id TEXT\n)"),
            "CREATE TABLE users ("
        );
    }
}
