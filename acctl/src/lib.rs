//! # acctl: account registration over a local SQLite database
//!
//! `acctl` serves the account registration write path and ships the tooling needed to keep the
//! local development database consistent with it.
//!
//! ## Architecture
//!
//! - **Registration** ([`registration`]): validates input, checks the schema, resolves username and
//!   email conflicts, hashes the password and writes the account. Preference rows and audit events
//!   are written best-effort after the account exists.
//! - **Store** ([`db`]): SQLite pool construction, error classification, schema readiness probe and
//!   the per-table handlers.
//! - **Database tooling** ([`devdb`]): resolves which physical file each launch profile uses,
//!   applies migrations idempotently and reports divergence between profiles. Exposed as
//!   `acctl db ...`.
//! - **HTTP** ([`api`]): the registration endpoints and a readiness check on axum.
//!
//! ## Request flow
//!
//! ```text
//! POST /api/v1/auth/register
//!   -> validate -> preflight -> pre-check conflicts -> hash -> INSERT users
//!   -> preferences (best effort) -> audit event (best effort) -> 201
//! ```
//!
//! ## Getting started
//!
//! ```bash
//! acctl db migrate   # create the schema in the file the service will use
//! acctl db verify    # confirm the admin and service profiles agree
//! acctl serve
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod devdb;
pub mod errors;
pub mod registration;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::db::pool::{self, OpenMode};
use crate::devdb::identity::{DatabaseIdentityResolver, LaunchProfile};
use crate::devdb::migrations::{MigrationApplier, MigrationMode, bundled_migrations, load_migrations};
use crate::registration::Registrar;
use anyhow::Context;
use axum::{Router, routing::get};
use bon::Builder;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, warn};

/// Shared state handed to every handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub registrar: Registrar,
}

impl AppState {
    /// State whose registrar uses the production hasher and id generator.
    pub fn from_pool(db: SqlitePool, config: Config) -> Self {
        let registrar = Registrar::from_config(db.clone(), &config);
        AppState::builder().db(db).config(config).registrar(registrar).build()
    }
}

/// Build the application router with the trace layer applied.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new().route(
        "/auth/register",
        get(api::handlers::auth::get_registration_info).post(api::handlers::auth::register),
    );

    Router::new()
        .route("/healthz", get(api::handlers::health::healthz))
        .nest("/api/v1", api_routes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Resolve the service profile's database file and open a pool on it. With `migrate_on_startup`
/// the file is created and migrated first.
pub async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let slow = Duration::from_millis(config.slow_statement_threshold_ms);
    let file = DatabaseIdentityResolver::new(config).resolve(LaunchProfile::Service).await?;
    info!(path = %file.path.display(), source = %file.source, "Using database file");

    if config.database.migrate_on_startup {
        let migrations = match &config.database.migrations_dir {
            Some(dir) => load_migrations(dir)?,
            None => bundled_migrations(),
        };
        let db = pool::connect(&file, &config.database, slow, OpenMode::Create)
            .await
            .with_context(|| format!("open {} for migration", file.path.display()))?;
        let report = MigrationApplier::new(&config.database.required_tables)
            .apply(MigrationMode::Always, &migrations, &db)
            .await;
        db.close().await;
        if !report.succeeded() {
            anyhow::bail!(
                "startup migration left required tables missing: {}",
                report.missing_tables.join(", ")
            );
        }
    } else if !file.exists {
        warn!(
            path = %file.path.display(),
            "Database file does not exist; registration will report the store as unavailable until `{}` is run",
            config.remediation.migrate_command
        );
    }

    Ok(pool::connect_lazy(&file, &config.database, slow))
}

/// The HTTP service.
///
/// 1. **Create**: [`Application::new`] resolves the database file, optionally migrates it and
///    builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future completes
pub struct Application {
    router: Router,
    config: Config,
    pool: SqlitePool,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting with configuration: {:#?}", config);
        let pool = setup_database(&config).await?;
        let router = build_router(AppState::from_pool(pool.clone(), config.clone()));
        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Listening on http://{}, available at http://localhost:{}", bind_addr, self.config.port);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;
        Ok(())
    }
}
