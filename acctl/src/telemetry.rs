//! Tracing initialization.
//!
//! Logs go to stderr through the fmt layer, filtered by `RUST_LOG` when it is set:
//!
//! ```bash
//! RUST_LOG=acctl=debug,sqlx=warn acctl serve
//! ```
//!
//! Slow SQL statements are reported by sqlx itself at warn level once they exceed
//! `slow_statement_threshold_ms`.

use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. `default_filter` applies only when `RUST_LOG` is unset.
pub fn init_telemetry(default_filter: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    debug!("Telemetry initialized");
    Ok(())
}
