//! Local database tooling.
//!
//! The local dev server stores each database as a SQLite file whose name is derived from how the
//! process was launched. An interactive admin command and the running service can therefore end up
//! looking at different files for the same logical database. This module finds those files
//! ([`identity`]), brings a file's schema up to date ([`migrations`]) and compares what the two
//! launch profiles see ([`verify`]). [`commands`] exposes all of it as `acctl db ...`.

pub mod commands;
pub mod identity;
pub mod migrations;
pub mod sql;
pub mod verify;

use crate::db::errors::DbError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevDbError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot derive a database id: {0}")]
    Identity(String),

    #[error(transparent)]
    Store(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, DevDbError>;
