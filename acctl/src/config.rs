//! Configuration loading.
//!
//! Configuration comes from a YAML file (default `config.yaml`, overridable with `-f` or
//! `ACCTL_CONFIG`) merged with `ACCTL_`-prefixed environment variables, where `__` separates
//! nesting levels:
//!
//! ```text
//! ACCTL_PORT=8080
//! ACCTL_DATABASE__NAME=accounts-db
//! ACCTL_REGISTRATION__ENABLED=true
//! ```
//!
//! Every section has defaults, so an empty file is a valid configuration for local development.

use crate::auth::password::Argon2Params;
use crate::devdb::identity::LaunchProfile;
use crate::errors::Error;
use clap::{Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Namespace under which the local dev server stores database object files.
pub const DEFAULT_NAMESPACE: &str = "miniflare-D1DatabaseObject";

/// CLI args - config file location plus the command to run
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "ACCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Local database tooling
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum DbCommand {
    /// Print the physical database file each launch profile resolves to
    Resolve {
        /// Only resolve this profile
        #[arg(long, value_enum)]
        profile: Option<LaunchProfile>,
    },
    /// List tables and `users` columns in the resolved file
    Status {
        #[arg(long, value_enum, default_value_t = LaunchProfile::Service)]
        profile: LaunchProfile,
    },
    /// Apply migrations idempotently to the resolved file
    Migrate {
        #[arg(long, value_enum, default_value_t = LaunchProfile::Service)]
        profile: LaunchProfile,
        /// Load migrations from this directory instead of the bundled set
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Do nothing if the required tables already exist
        #[arg(long)]
        if_missing: bool,
    },
    /// Compare the schema seen by the service and admin profiles
    Verify,
    /// Report binding configuration smells
    Lint,
}

/// Main application configuration.
///
/// All fields have defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    pub database: DatabaseConfig,
    /// Statements slower than this are logged at warn level (milliseconds)
    pub slow_statement_threshold_ms: u64,
    pub registration: RegistrationConfig,
    pub remediation: RemediationConfig,
}

/// Binding and storage settings for the account database.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Name the application uses for the database handle
    pub binding: String,
    /// Logical database name
    pub name: String,
    /// Remote database id, when one is configured
    pub database_id: Option<String>,
    /// Root of the local dev server's database state
    pub state_dir: PathBuf,
    /// How a launch profile maps to a physical file
    pub identity: IdentityRule,
    /// Load migrations from disk instead of the bundled set
    pub migrations_dir: Option<PathBuf>,
    /// Tables the write path cannot work without
    pub required_tables: Vec<String>,
    /// Apply migrations once before accepting traffic
    pub migrate_on_startup: bool,
    pub pool: PoolSettings,
    /// How long SQLite waits on a locked database before failing
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            binding: "DB".to_string(),
            name: "accounts-db".to_string(),
            database_id: None,
            state_dir: PathBuf::from(".wrangler/state/v3/d1"),
            identity: IdentityRule::default(),
            migrations_dir: None,
            required_tables: vec!["users".to_string()],
            migrate_on_startup: false,
            pool: PoolSettings::default(),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Rule for turning (binding, launch profile) into a physical database file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IdentityRule {
    /// Both profiles use one configured file. Recommended: removes the divergence entirely.
    Explicit { path: PathBuf },
    /// File id derived from the namespace and the profile's object name, unless pinned.
    Derived {
        #[serde(default = "default_namespace")]
        namespace: String,
        #[serde(default)]
        pinned_service_id: Option<String>,
        #[serde(default)]
        pinned_admin_id: Option<String>,
    },
    /// Pick the best existing file under the namespace directory.
    Discover {
        #[serde(default = "default_namespace")]
        namespace: String,
    },
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for IdentityRule {
    fn default() -> Self {
        IdentityRule::Derived {
            namespace: default_namespace(),
            pinned_service_id: None,
            pinned_admin_id: None,
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds, 0 = never)
    pub idle_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 0,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrationConfig {
    /// Whether new accounts can be created
    pub enabled: bool,
    pub username: UsernamePolicy,
    pub password: PasswordConfig,
    /// Longest accepted email address
    pub email_max_length: usize,
    /// Header carrying the client address. `x-forwarded-for` is consulted when it is absent.
    pub client_ip_header: String,
    pub preferences: PreferenceDefaults,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: UsernamePolicy::default(),
            password: PasswordConfig::default(),
            email_max_length: 255,
            client_ip_header: "cf-connecting-ip".to_string(),
            preferences: PreferenceDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UsernamePolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for UsernamePolicy {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 20,
        }
    }
}

/// Password length limits and Argon2 hashing parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,
    /// Argon2 time cost (iterations)
    pub argon2_iterations: u32,
    /// Argon2 parallelism
    pub argon2_parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        let argon2 = Argon2Params::default();
        Self {
            min_length: 8,
            max_length: 128,
            argon2_memory_kib: argon2.memory_kib,
            argon2_iterations: argon2.iterations,
            argon2_parallelism: argon2.parallelism,
        }
    }
}

impl PasswordConfig {
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

/// Values written to a new account's preference row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreferenceDefaults {
    pub theme: String,
    pub page_size: i64,
    pub view_mode: String,
    pub density: String,
    pub tag_layout: String,
    pub sort_by: String,
}

impl Default for PreferenceDefaults {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            page_size: 30,
            view_mode: "list".to_string(),
            density: "normal".to_string(),
            tag_layout: "grid".to_string(),
            sort_by: "popular".to_string(),
        }
    }
}

/// Commands quoted back to operators when the store is not ready.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemediationConfig {
    pub migrate_command: String,
    pub verify_command: String,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            migrate_command: "acctl db migrate".to_string(),
            verify_command: "acctl db verify".to_string(),
        }
    }
}

impl RemediationConfig {
    /// Hint for a store that cannot be opened.
    pub fn for_unavailable(&self) -> String {
        format!(
            "Check that the local database file exists and is readable; `{}` shows which file each launch profile uses",
            self.verify_command
        )
    }

    /// Hint for a store that is missing part of its schema.
    pub fn for_missing(&self, object: &str) -> String {
        format!(
            "`{object}` is missing: run `{}` against the database the service uses, then `{}` to confirm both launch profiles agree",
            self.migrate_command, self.verify_command
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database: DatabaseConfig::default(),
            slow_statement_threshold_ms: 500,
            registration: RegistrationConfig::default(),
            remediation: RemediationConfig::default(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), Error> {
        let db = &self.database;
        if db.binding.trim().is_empty() || db.name.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: database.binding and database.name must be non-empty".to_string(),
            });
        }
        if db.required_tables.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: database.required_tables must name at least one table".to_string(),
            });
        }
        if db.pool.max_connections == 0 {
            return Err(Error::Internal {
                operation: "Config validation: database.pool.max_connections cannot be 0".to_string(),
            });
        }
        let namespace = match &db.identity {
            IdentityRule::Derived { namespace, .. } | IdentityRule::Discover { namespace } => Some(namespace),
            IdentityRule::Explicit { .. } => None,
        };
        if namespace.is_some_and(|ns| ns.trim().is_empty()) {
            return Err(Error::Internal {
                operation: "Config validation: database.identity.namespace must be non-empty".to_string(),
            });
        }

        let username = &self.registration.username;
        if username.min_length == 0 || username.min_length > username.max_length {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: username min_length ({}) must be positive and not exceed max_length ({})",
                    username.min_length, username.max_length
                ),
            });
        }

        let password = &self.registration.password;
        if password.min_length == 0 || password.min_length > password.max_length {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: password min_length ({}) must be positive and not exceed max_length ({})",
                    password.min_length, password.max_length
                ),
            });
        }
        if password.argon2_iterations == 0 || password.argon2_parallelism == 0 || password.argon2_memory_kib < 8 * password.argon2_parallelism
        {
            return Err(Error::Internal {
                operation: "Config validation: argon2 iterations and parallelism must be positive and memory_kib at least 8 * parallelism"
                    .to_string(),
            });
        }

        if self.registration.email_max_length == 0 {
            return Err(Error::Internal {
                operation: "Config validation: registration.email_max_length cannot be 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("ACCTL_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
            command: None,
        }
    }

    #[test]
    fn test_defaults_from_empty_file() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "")?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 3001);
            assert_eq!(config.database.binding, "DB");
            assert_eq!(config.database.required_tables, vec!["users".to_string()]);
            assert_eq!(config.database.busy_timeout, Duration::from_secs(5));
            assert!(!config.registration.enabled);
            assert_eq!(config.registration.username.max_length, 20);
            assert_eq!(config.registration.password.min_length, 8);
            assert_eq!(config.registration.preferences.sort_by, "popular");
            assert!(matches!(
                config.database.identity,
                IdentityRule::Derived { ref namespace, .. } if namespace == DEFAULT_NAMESPACE
            ));
            assert!(config.validate().is_ok());

            Ok(())
        });
    }

    #[test]
    fn test_identity_rules_parse() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
database:
  name: tmarks-prod-db
  database_id: local
  busy_timeout: 250ms
  identity:
    mode: derived
    pinned_admin_id: 7f3a
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;
            assert_eq!(config.database.database_id.as_deref(), Some("local"));
            assert_eq!(config.database.busy_timeout, Duration::from_millis(250));
            assert_eq!(
                config.database.identity,
                IdentityRule::Derived {
                    namespace: DEFAULT_NAMESPACE.to_string(),
                    pinned_service_id: None,
                    pinned_admin_id: Some("7f3a".to_string()),
                }
            );

            jail.create_file(
                "explicit.yaml",
                r#"
database:
  identity:
    mode: explicit
    path: /tmp/accounts.sqlite
"#,
            )?;
            let config = Config::load(&args("explicit.yaml"))?;
            assert_eq!(
                config.database.identity,
                IdentityRule::Explicit {
                    path: PathBuf::from("/tmp/accounts.sqlite")
                }
            );

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 4000\n")?;

            jail.set_env("ACCTL_PORT", "8080");
            jail.set_env("ACCTL_REGISTRATION__ENABLED", "true");
            jail.set_env("ACCTL_DATABASE__NAME", "accounts-staging");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 8080);
            assert!(config.registration.enabled);
            assert_eq!(config.database.name, "accounts-staging");

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "registration:\n  allow: true\n")?;
            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_inconsistent_bounds() {
        let mut config = Config::default();
        config.registration.password.min_length = 200;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.registration.username.min_length = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.binding = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.registration.password.argon2_parallelism = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remediation_mentions_commands() {
        let remediation = RemediationConfig::default();
        let hint = remediation.for_missing("users");
        assert!(hint.contains("acctl db migrate"));
        assert!(hint.contains("users"));
        assert!(remediation.for_unavailable().contains("acctl db verify"));
    }
}
