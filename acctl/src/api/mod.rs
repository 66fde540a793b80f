//! HTTP binding of the registration write path.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response bodies
//!
//! Routes:
//!
//! - `GET /api/v1/auth/register`: whether registration is open
//! - `POST /api/v1/auth/register`: create an account
//! - `GET /healthz`: store readiness

pub mod handlers;
pub mod models;
