//! Failure tolerance of a registration step.
//!
//! A [`Tier::Strict`] step aborts the request when it fails. A [`Tier::BestEffort`] step has its
//! failure logged at the given [`Severity`] and the request carries on.

use std::fmt::Display;
use std::future::Future;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Strict,
    BestEffort(Severity),
}

/// Run one step under `tier`.
///
/// Returns `Ok(Some(value))` on success, `Err` for a failed strict step and `Ok(None)` for a failed
/// best-effort step.
pub async fn run_step<T, E, F>(tier: Tier, step: &'static str, fut: F) -> Result<Option<T>, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Ok(Some(value)),
        Err(err) => match tier {
            Tier::Strict => {
                debug!(step, error = %err, "Step failed, aborting registration");
                Err(err)
            }
            Tier::BestEffort(Severity::Warn) => {
                warn!(step, error = %err, "Best-effort step failed, continuing");
                Ok(None)
            }
            Tier::BestEffort(Severity::Error) => {
                error!(step, error = %err, "Best-effort step failed, continuing");
                Ok(None)
            }
        },
    }
}
