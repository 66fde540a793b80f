//! Test utilities shared by the unit tests.

use crate::auth::password::CredentialHasher;
use crate::config::{Config, PasswordConfig, PoolSettings};
use crate::devdb::migrations::{MigrationApplier, MigrationFile, bundled_migrations};
use crate::errors::Error;
use crate::registration::Registrar;
use crate::types::{format_timestamp, now_millis};
use sqlx::SqlitePool;

pub fn required_tables() -> Vec<String> {
    vec!["users".to_string()]
}

/// Apply every bundled migration.
pub async fn apply_test_schema(pool: &SqlitePool) {
    apply_migrations(pool, bundled_migrations()).await;
}

/// Apply the bundled migrations up to and including `max_sequence`, leaving the schema as an older
/// deployment would have it.
pub async fn apply_test_schema_through(pool: &SqlitePool, max_sequence: u32) {
    let migrations = bundled_migrations().into_iter().filter(|m| m.sequence <= max_sequence).collect();
    apply_migrations(pool, migrations).await;
}

async fn apply_migrations(pool: &SqlitePool, migrations: Vec<MigrationFile>) {
    let expected = required_tables();
    let report = MigrationApplier::new(&expected).apply_all(&migrations, pool).await;
    assert!(report.succeeded(), "test schema failed to apply: {report:?}");
}

/// Insert a user row directly, bypassing registration.
pub async fn insert_bare_user(pool: &SqlitePool, id: &str, username: &str) {
    let now = format_timestamp(&now_millis());
    sqlx::query("INSERT INTO users (id, username, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(username)
        .bind("not-a-real-hash")
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .expect("Failed to insert test user");
}

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.database.pool = PoolSettings {
        max_connections: 2,
        min_connections: 0,
        ..Default::default()
    };
    config.registration.enabled = true;
    // Cheapest parameters argon2 accepts
    config.registration.password = PasswordConfig {
        argon2_memory_kib: 128,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..Default::default()
    };
    config
}

pub fn test_registrar(pool: SqlitePool) -> Registrar {
    Registrar::from_config(pool, &create_test_config())
}

/// Hasher that always fails.
pub struct FailingHasher;

impl CredentialHasher for FailingHasher {
    fn hash(&self, _password: &str) -> Result<String, Error> {
        Err(Error::CredentialProcessingFailed {
            reason: "hasher unavailable".to_string(),
        })
    }
}
