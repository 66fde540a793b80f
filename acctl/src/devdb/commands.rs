//! `acctl db ...` subcommands.
//!
//! Each command writes a human-readable report to `out` and returns whether the database state is
//! healthy, which the binary turns into the process exit code.

use crate::config::{Config, DbCommand};
use crate::db::handlers::Users;
use crate::db::pool::{self, OpenMode};
use crate::db::probe::{Readiness, SchemaProbe};
use crate::devdb::identity::{DatabaseIdentityResolver, LaunchProfile, LintSeverity, PhysicalDatabaseFile};
use crate::devdb::migrations::{MigrationApplier, MigrationFile, MigrationMode, StatementOutcome, bundled_migrations, load_migrations};
use crate::devdb::verify::ConsistencyVerifier;
use anyhow::Context;
use sqlx::SqlitePool;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Run one subcommand. `Ok(false)` means the command ran but found a problem.
pub async fn run<W: Write>(config: &Config, command: &DbCommand, out: &mut W) -> anyhow::Result<bool> {
    match command {
        DbCommand::Resolve { profile } => resolve(config, *profile, out).await,
        DbCommand::Status { profile } => status(config, *profile, out).await,
        DbCommand::Migrate { profile, dir, if_missing } => {
            let mode = if *if_missing { MigrationMode::IfMissing } else { MigrationMode::Always };
            migrate(config, *profile, dir.as_deref(), mode, out).await
        }
        DbCommand::Verify => verify(config, out).await,
        DbCommand::Lint => lint(config, out),
    }
}

fn slow_threshold(config: &Config) -> Duration {
    Duration::from_millis(config.slow_statement_threshold_ms)
}

fn describe(file: &PhysicalDatabaseFile) -> String {
    format!(
        "{:<8} {} ({}, {})",
        file.profile,
        file.path.display(),
        file.source,
        if file.exists { "exists" } else { "not created yet" }
    )
}

async fn open_existing(config: &Config, file: &PhysicalDatabaseFile) -> anyhow::Result<SqlitePool> {
    pool::connect(file, &config.database, slow_threshold(config), OpenMode::Existing)
        .await
        .with_context(|| format!("open {}", file.path.display()))
}

async fn resolve<W: Write>(config: &Config, profile: Option<LaunchProfile>, out: &mut W) -> anyhow::Result<bool> {
    let resolver = DatabaseIdentityResolver::new(config);
    let files = match profile {
        Some(profile) => vec![resolver.resolve(profile).await?],
        None => resolver.resolve_all().await?,
    };
    for file in &files {
        writeln!(out, "{}", describe(file))?;
    }
    if let [service, admin] = files.as_slice() {
        if !service.same_file(admin) {
            writeln!(out, "warning: the service and admin profiles use different files")?;
        }
    }
    Ok(true)
}

async fn status<W: Write>(config: &Config, profile: LaunchProfile, out: &mut W) -> anyhow::Result<bool> {
    let file = DatabaseIdentityResolver::new(config).resolve(profile).await?;
    writeln!(out, "{}", describe(&file))?;
    if !file.exists {
        writeln!(out, "database file does not exist yet; run `{}` to create it", config.remediation.migrate_command)?;
        return Ok(true);
    }

    let db = open_existing(config, &file).await?;
    let probe = SchemaProbe::new(&db, &config.database.required_tables);
    let tables = probe.list_tables().await?;
    writeln!(out, "tables ({}): {}", tables.len(), tables.join(", "))?;

    let columns = probe.table_columns("users").await?;
    if columns.is_empty() {
        writeln!(out, "users: table not found")?;
    } else {
        writeln!(out, "users columns:")?;
        for column in &columns {
            writeln!(
                out,
                "  {:<16} {:<8}{}{}",
                column.name,
                column.data_type,
                if column.not_null { " not null" } else { "" },
                if column.primary_key_position > 0 { " primary key" } else { "" }
            )?;
        }
        let count = Users::new(&mut *db.acquire().await?).count().await?;
        writeln!(out, "users rows: {count}")?;
    }

    let readiness = probe.check_ready().await;
    db.close().await;
    match &readiness {
        Readiness::Ready => writeln!(out, "ready")?,
        Readiness::Missing { object } => writeln!(out, "not ready: {object} is missing")?,
        Readiness::Unavailable { reason } => writeln!(out, "not ready: {reason}")?,
    }
    Ok(readiness.is_ready())
}

fn migrations_for(config: &Config, dir: Option<&Path>) -> anyhow::Result<Vec<MigrationFile>> {
    match dir.or(config.database.migrations_dir.as_deref()) {
        Some(dir) => Ok(load_migrations(dir)?),
        None => Ok(bundled_migrations()),
    }
}

async fn migrate<W: Write>(
    config: &Config,
    profile: LaunchProfile,
    dir: Option<&Path>,
    mode: MigrationMode,
    out: &mut W,
) -> anyhow::Result<bool> {
    let migrations = migrations_for(config, dir)?;
    let file = DatabaseIdentityResolver::new(config).resolve(profile).await?;
    writeln!(out, "{}", describe(&file))?;

    let db = pool::connect(&file, &config.database, slow_threshold(config), OpenMode::Create)
        .await
        .with_context(|| format!("open {}", file.path.display()))?;
    let report = MigrationApplier::new(&config.database.required_tables)
        .apply(mode, &migrations, &db)
        .await;
    db.close().await;

    if report.skipped {
        writeln!(out, "expected tables already present, nothing to do")?;
        return Ok(true);
    }
    for file_report in &report.files {
        let already = file_report
            .statements
            .iter()
            .filter(|s| matches!(s.outcome, StatementOutcome::AlreadyApplied { .. }))
            .count();
        writeln!(
            out,
            "{:<40} {:?} ({} statements, {} already applied)",
            file_report.name,
            file_report.status,
            file_report.statements.len(),
            already
        )?;
    }
    for (name, statement) in report.failed_statements() {
        if let StatementOutcome::Failed { error } = &statement.outcome {
            writeln!(out, "failed: {name}: {}: {error}", statement.summary)?;
        }
    }

    if report.succeeded() {
        writeln!(out, "ok: {} present", config.database.required_tables.join(", "))?;
    } else {
        writeln!(out, "error: missing tables after migration: {}", report.missing_tables.join(", "))?;
    }
    Ok(report.succeeded())
}

async fn verify<W: Write>(config: &Config, out: &mut W) -> anyhow::Result<bool> {
    let resolver = DatabaseIdentityResolver::new(config);
    let live = resolver.resolve(LaunchProfile::Service).await?;
    let admin = resolver.resolve(LaunchProfile::Admin).await?;
    writeln!(out, "{}", describe(&live))?;
    writeln!(out, "{}", describe(&admin))?;

    let verifier = ConsistencyVerifier::new(&config.database.required_tables);
    let live_db = if live.exists { Some(open_existing(config, &live).await?) } else { None };
    let report = if live.same_file(&admin) {
        verifier.diff(live_db.as_ref(), live_db.as_ref()).await?
    } else {
        let admin_db = if admin.exists { Some(open_existing(config, &admin).await?) } else { None };
        let report = verifier.diff(live_db.as_ref(), admin_db.as_ref()).await?;
        if let Some(db) = admin_db {
            db.close().await;
        }
        report
    };
    if let Some(db) = live_db {
        db.close().await;
    }

    if report.is_consistent() {
        writeln!(out, "consistent: both profiles see {} tables", report.live_tables.len())?;
        return Ok(true);
    }
    if !report.split_database.is_empty() {
        writeln!(
            out,
            "split database: admin commands see {} but the service does not; they are using different files",
            report.split_database.join(", ")
        )?;
    }
    if !report.missing_on_admin.is_empty() {
        writeln!(out, "admin path is missing: {}", report.missing_on_admin.join(", "))?;
    }
    if !report.never_migrated.is_empty() {
        writeln!(
            out,
            "never migrated: {}; run `{}`",
            report.never_migrated.join(", "),
            config.remediation.migrate_command
        )?;
    }
    Ok(false)
}

fn lint<W: Write>(config: &Config, out: &mut W) -> anyhow::Result<bool> {
    let findings = DatabaseIdentityResolver::new(config).lint();
    if findings.is_empty() {
        writeln!(out, "no binding configuration issues found")?;
    }
    for finding in &findings {
        let label = match finding.severity {
            LintSeverity::Warning => "warning",
            LintSeverity::Error => "error",
        };
        writeln!(out, "{label}: {}", finding.message)?;
    }
    Ok(!findings.iter().any(|f| f.severity == LintSeverity::Error))
}
