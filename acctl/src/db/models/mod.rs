//! Database record structures.

pub mod audit_logs;
pub mod users;
