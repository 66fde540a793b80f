//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed connection and owns the SQL for one table:
//!
//! - [`Users`]: account existence checks and creation
//! - [`Preferences`]: preference rows, written through a [`preferences::PreferenceShape`]
//! - [`AuditLogs`]: append-only event records
//!
//! ```ignore
//! let mut conn = pool.acquire().await?;
//! let mut repo = Users::new(&mut conn);
//! if repo.exists_by_email("alice@example.com").await? { /* ... */ }
//! ```

pub mod audit_logs;
pub mod preferences;
pub mod users;

pub use audit_logs::AuditLogs;
pub use preferences::Preferences;
pub use users::Users;
