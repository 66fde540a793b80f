//! Common type definitions shared across the registration path and the tooling.
//!
//! # ID Types
//!
//! - [`UserId`]: opaque account identifier produced by an [`crate::auth::ids::IdGenerator`]
//!
//! # Timestamps
//!
//! Stored timestamps are UTC RFC 3339 strings with millisecond precision (`2024-05-01T08:30:00.123Z`),
//! which sort lexically in the same order as chronologically. [`now_millis`] and [`format_timestamp`]
//! are the only places that produce them.
//!
//! # Utility Functions
//!
//! - [`abbrev_id`]: Abbreviate ids to their first 8 chars for logging

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Opaque account identifier. Never parsed by this crate.
pub type UserId = String;

/// Abbreviate an id to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Current time truncated to millisecond precision, so the value handed back to callers is exactly
/// the value written to the store.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Render a timestamp the way it is stored.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde helper writing a timestamp in its stored form.
pub fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

/// Account field that can collide with an existing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictField {
    Username,
    Email,
}

impl ConflictField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictField::Username => "username",
            ConflictField::Email => "email",
        }
    }
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
