//! HTTP request handlers.
//!
//! - [`auth`]: registration info and account creation
//! - [`health`]: store readiness

pub mod auth;
pub mod health;
