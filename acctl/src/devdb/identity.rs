//! Mapping a binding configuration and launch profile to a physical database file.
//!
//! Under the `derived` rule the file name is a durable-object style id computed from a namespace
//! and an object name:
//!
//! ```text
//! key = SHA256(namespace)
//! a   = HMAC-SHA256(key, object_name)[..16]
//! b   = HMAC-SHA256(key, a)[..16]
//! id  = hex(a || b)
//! ```
//!
//! The service profile names the object after the logical database name, while the admin profile
//! uses the configured `database_id` when there is one. The two profiles therefore land on
//! different files whenever a `database_id` is set and differs from the name. Pinning ids or
//! switching to the `explicit` rule removes the divergence.

use crate::config::{Config, IdentityRule};
use crate::db::pool::{self, OpenMode};
use crate::db::probe::SchemaProbe;
use crate::devdb::{DevDbError, Result};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// File extension of database object files.
pub const DATABASE_FILE_EXTENSION: &str = "sqlite";

/// How the process touching the database was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LaunchProfile {
    /// Embedded dev-server launch of the service
    Service,
    /// Interactive administrative command
    Admin,
}

impl LaunchProfile {
    pub const ALL: [LaunchProfile; 2] = [LaunchProfile::Service, LaunchProfile::Admin];
}

impl fmt::Display for LaunchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchProfile::Service => f.write_str("service"),
            LaunchProfile::Admin => f.write_str("admin"),
        }
    }
}

/// Which rule produced a [`PhysicalDatabaseFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Explicit,
    Pinned,
    Derived,
    Discovered,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentitySource::Explicit => "explicit",
            IdentitySource::Pinned => "pinned",
            IdentitySource::Derived => "derived",
            IdentitySource::Discovered => "discovered",
        };
        f.write_str(s)
    }
}

/// A database file as seen by one launch profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhysicalDatabaseFile {
    pub path: PathBuf,
    pub profile: LaunchProfile,
    pub source: IdentitySource,
    pub exists: bool,
}

impl PhysicalDatabaseFile {
    pub fn new(path: PathBuf, profile: LaunchProfile, source: IdentitySource) -> Self {
        let exists = path.is_file();
        Self {
            path,
            profile,
            source,
            exists,
        }
    }

    pub fn same_file(&self, other: &PhysicalDatabaseFile) -> bool {
        if self.path == other.path {
            return true;
        }
        match (self.path.canonicalize(), other.path.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Durable-object style id for `object_name` within `namespace`: 64 lowercase hex characters.
pub fn derive_object_id(namespace: &str, object_name: &str) -> Result<String> {
    let key = Sha256::digest(namespace.as_bytes());

    let mut mac = HmacSha256::new_from_slice(&key).map_err(|e| DevDbError::Identity(e.to_string()))?;
    mac.update(object_name.as_bytes());
    let name_mac = mac.finalize().into_bytes();
    let a = &name_mac[..16];

    let mut mac = HmacSha256::new_from_slice(&key).map_err(|e| DevDbError::Identity(e.to_string()))?;
    mac.update(a);
    let check_mac = mac.finalize().into_bytes();
    let b = &check_mac[..16];

    Ok(a.iter().chain(b).map(|byte| format!("{byte:02x}")).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    Warning,
    Error,
}

/// A binding configuration smell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintFinding {
    pub severity: LintSeverity,
    pub message: String,
}

impl LintFinding {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: LintSeverity::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: LintSeverity::Error,
            message: message.into(),
        }
    }
}

pub struct DatabaseIdentityResolver<'a> {
    config: &'a Config,
}

impl<'a> DatabaseIdentityResolver<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Object name a profile derives its file id from.
    pub fn object_name(&self, profile: LaunchProfile) -> &str {
        let db = &self.config.database;
        match (profile, db.database_id.as_deref()) {
            (LaunchProfile::Admin, Some(id)) if !id.trim().is_empty() => id,
            _ => &db.name,
        }
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.config.database.state_dir.join(namespace)
    }

    fn file_for_id(&self, namespace: &str, id: &str) -> PathBuf {
        self.namespace_dir(namespace).join(format!("{id}.{DATABASE_FILE_EXTENSION}"))
    }

    /// Path a profile would use under the `derived` rule, ignoring what is on disk.
    pub fn derived_file(&self, profile: LaunchProfile, namespace: &str) -> Result<PhysicalDatabaseFile> {
        let id = derive_object_id(namespace, self.object_name(profile))?;
        Ok(PhysicalDatabaseFile::new(
            self.file_for_id(namespace, &id),
            profile,
            IdentitySource::Derived,
        ))
    }

    /// File a profile uses under the `derived` rule: its pinned id when set, the derived id otherwise.
    fn pinned_or_derived(
        &self,
        profile: LaunchProfile,
        namespace: &str,
        pinned_service_id: &Option<String>,
        pinned_admin_id: &Option<String>,
    ) -> Result<PhysicalDatabaseFile> {
        let pinned = match profile {
            LaunchProfile::Service => pinned_service_id,
            LaunchProfile::Admin => pinned_admin_id,
        };
        match pinned.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Ok(PhysicalDatabaseFile::new(
                self.file_for_id(namespace, id),
                profile,
                IdentitySource::Pinned,
            )),
            None => self.derived_file(profile, namespace),
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, profile: LaunchProfile) -> Result<PhysicalDatabaseFile> {
        let file = match &self.config.database.identity {
            IdentityRule::Explicit { path } => PhysicalDatabaseFile::new(path.clone(), profile, IdentitySource::Explicit),
            IdentityRule::Derived {
                namespace,
                pinned_service_id,
                pinned_admin_id,
            } => self.pinned_or_derived(profile, namespace, pinned_service_id, pinned_admin_id)?,
            IdentityRule::Discover { namespace } => self.discover(profile, namespace).await?,
        };
        debug!(path = %file.path.display(), source = %file.source, exists = file.exists, "Resolved database file");
        Ok(file)
    }

    /// Service profile first, then admin.
    pub async fn resolve_all(&self) -> Result<Vec<PhysicalDatabaseFile>> {
        let mut files = Vec::with_capacity(LaunchProfile::ALL.len());
        for profile in LaunchProfile::ALL {
            files.push(self.resolve(profile).await?);
        }
        Ok(files)
    }

    /// Pick the best existing file in the namespace directory: files holding the required tables
    /// first, newest modification time next. Falls back to the derived path when the directory
    /// has no candidates.
    async fn discover(&self, profile: LaunchProfile, namespace: &str) -> Result<PhysicalDatabaseFile> {
        let dir = self.namespace_dir(namespace);
        let candidates = list_database_files(&dir)?;
        if candidates.is_empty() {
            info!(dir = %dir.display(), "No database files to discover, using derived path");
            return self.derived_file(profile, namespace);
        }

        let mut ranked = Vec::with_capacity(candidates.len());
        for (path, modified) in candidates {
            let candidate = PhysicalDatabaseFile::new(path, profile, IdentitySource::Discovered);
            let ready = self.has_required_tables(&candidate).await;
            debug!(path = %candidate.path.display(), ready, "Probed discovery candidate");
            ranked.push((ready, modified, candidate));
        }
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

        let (ready, _, best) = ranked.remove(0);
        if !ready {
            warn!(path = %best.path.display(), "No discovered database has the required tables, using the newest file");
        }
        Ok(best)
    }

    async fn has_required_tables(&self, file: &PhysicalDatabaseFile) -> bool {
        let slow = Duration::from_millis(self.config.slow_statement_threshold_ms);
        let db = match pool::connect(file, &self.config.database, slow, OpenMode::Existing).await {
            Ok(db) => db,
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "Could not open discovery candidate");
                return false;
            }
        };
        let ready = SchemaProbe::new(&db, &self.config.database.required_tables)
            .check_ready()
            .await
            .is_ready();
        db.close().await;
        ready
    }

    /// Binding configuration smells.
    pub fn lint(&self) -> Vec<LintFinding> {
        let db = &self.config.database;
        let mut findings = Vec::new();

        if db.binding.trim().is_empty() {
            findings.push(LintFinding::error("database.binding is empty"));
        }
        if db.name.trim().is_empty() {
            findings.push(LintFinding::error("database.name is empty"));
        }
        if db.database_id.as_deref().is_some_and(|id| id.trim().eq_ignore_ascii_case("local")) {
            findings.push(LintFinding::warning(
                "database.database_id is \"local\": admin commands will derive their file from this placeholder instead of the database name",
            ));
        }

        match &db.identity {
            IdentityRule::Derived {
                namespace,
                pinned_service_id,
                pinned_admin_id,
            } => {
                let service =
                    self.pinned_or_derived(LaunchProfile::Service, namespace, pinned_service_id, pinned_admin_id);
                let admin = self.pinned_or_derived(LaunchProfile::Admin, namespace, pinned_service_id, pinned_admin_id);
                match (service, admin) {
                    (Ok(service), Ok(admin)) => {
                        if service.path != admin.path {
                            findings.push(LintFinding::warning(format!(
                                "service and admin profiles resolve to different files ({} vs {}); pin both ids or use an explicit path",
                                service.path.display(),
                                admin.path.display()
                            )));
                        }
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        findings.push(LintFinding::error(format!("could not derive the database file: {e}")));
                    }
                }
            }
            IdentityRule::Discover { .. } => findings.push(LintFinding::warning(
                "identity mode \"discover\" picks a file heuristically; prefer an explicit path",
            )),
            IdentityRule::Explicit { path } => {
                if !path.is_file() {
                    findings.push(LintFinding::warning(format!(
                        "explicit database file {} does not exist yet; run the migrate command to create it",
                        path.display()
                    )));
                }
            }
        }

        findings
    }
}

/// `*.sqlite` files directly under `dir` with their modification times. A missing directory has no
/// files.
fn list_database_files(dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(DevDbError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DevDbError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(DATABASE_FILE_EXTENSION) {
            continue;
        }
        let metadata = entry.metadata().map_err(|source| DevDbError::Io {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, modified));
    }
    Ok(files)
}
