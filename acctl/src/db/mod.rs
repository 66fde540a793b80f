//! Database layer for the account store.
//!
//! This module implements data access with SQLx over SQLite files.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ registration │  (write protocol)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │   handlers   │  (one repository per table)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │    models    │  (records written and read)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │    SQLite    │
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository structs wrapping a connection
//! - [`models`]: Records matching table schemas
//! - [`probe`]: Readiness checks and schema introspection
//! - [`pool`]: Opening a pool for a resolved database file
//! - [`errors`]: Message-driven classification of store errors
//!
//! ## Example Usage
//!
//! ```ignore
//! use acctl::db::handlers::Users;
//!
//! async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let taken = Users::new(&mut conn).exists_by_username("alice_01").await?;
//!     println!("taken: {taken}");
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
pub mod pool;
pub mod probe;
