use thiserror::Error;

/// Unified error type for store operations that application code can handle.
///
/// SQLite reports most conditions only through its message text, so classification is driven by
/// [`STORE_ERROR_PATTERNS`] rather than by error codes.
#[derive(Error, Debug)]
pub enum DbError {
    /// Unique constraint violation, e.g. `UNIQUE constraint failed: users.username`
    #[error("Unique constraint violation")]
    UniqueViolation {
        /// `table.column` as reported by the store, if extractable
        constraint: Option<String>,
        message: String,
    },

    /// The statement referenced a table that does not exist
    #[error("Missing table {}", table.as_deref().unwrap_or("<unknown>"))]
    NoSuchTable { table: Option<String>, message: String },

    /// The statement referenced a column that does not exist
    #[error("Missing column {}", column.as_deref().unwrap_or("<unknown>"))]
    NoSuchColumn { column: Option<String>, message: String },

    /// Table, index or trigger already exists (re-applied DDL)
    #[error("Schema object already exists")]
    AlreadyExists { message: String },

    /// `ALTER TABLE ... ADD COLUMN` for a column that is already there
    #[error("Duplicate column {}", column.as_deref().unwrap_or("<unknown>"))]
    DuplicateColumn { column: Option<String>, message: String },

    /// The database file could not be opened or the pool could not hand out a connection
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Message-derived class of a store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorClass {
    NoSuchTable,
    NoSuchColumn,
    UniqueViolation,
    AlreadyExists,
    DuplicateColumn,
    Unavailable,
}

/// Lowercase message fragment -> class. First match wins.
pub const STORE_ERROR_PATTERNS: &[(&str, StoreErrorClass)] = &[
    ("no such table", StoreErrorClass::NoSuchTable),
    ("no such column", StoreErrorClass::NoSuchColumn),
    ("has no column named", StoreErrorClass::NoSuchColumn),
    ("unique constraint failed", StoreErrorClass::UniqueViolation),
    ("duplicate column name", StoreErrorClass::DuplicateColumn),
    ("already exists", StoreErrorClass::AlreadyExists),
    ("unable to open database file", StoreErrorClass::Unavailable),
    ("file is not a database", StoreErrorClass::Unavailable),
];

/// Classify a raw store message against [`STORE_ERROR_PATTERNS`].
pub fn classify_message(message: &str) -> Option<StoreErrorClass> {
    let lowered = message.to_ascii_lowercase();
    STORE_ERROR_PATTERNS
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, class)| *class)
}

/// Extract the object name following the first `": "` in a store message.
///
/// `no such column: tag_layout` -> `tag_layout`, `UNIQUE constraint failed: users.email` -> `users.email`.
/// Composite constraints (`users.a, users.b`) keep only the first column.
fn subject_after_colon(message: &str) -> Option<String> {
    let (_, rest) = message.split_once(": ")?;
    let subject = rest.split([',', ' ', '\n']).next()?.trim();
    (!subject.is_empty()).then(|| subject.to_string())
}

/// Column named by a missing-column message. Reads report `no such column: x`, inserts report
/// `table t has no column named x`.
fn missing_column_name(message: &str) -> Option<String> {
    let column = match message.split_once("has no column named ") {
        Some((_, rest)) => rest.split_whitespace().next().map(str::to_string),
        None => subject_after_colon(message),
    }?;
    Some(column.rsplit('.').next().unwrap_or(&column).to_string())
}

impl DbError {
    /// Build a classified error from a raw store message.
    pub fn from_message(message: &str) -> Option<Self> {
        let message_owned = message.to_string();
        let class = classify_message(message)?;
        Some(match class {
            StoreErrorClass::NoSuchTable => DbError::NoSuchTable {
                table: subject_after_colon(message),
                message: message_owned,
            },
            StoreErrorClass::NoSuchColumn => DbError::NoSuchColumn {
                column: missing_column_name(message),
                message: message_owned,
            },
            StoreErrorClass::UniqueViolation => DbError::UniqueViolation {
                constraint: subject_after_colon(message),
                message: message_owned,
            },
            StoreErrorClass::DuplicateColumn => DbError::DuplicateColumn {
                column: subject_after_colon(message),
                message: message_owned,
            },
            StoreErrorClass::AlreadyExists => DbError::AlreadyExists { message: message_owned },
            StoreErrorClass::Unavailable => DbError::Unavailable(message_owned),
        })
    }

    /// Column half of a `table.column` unique constraint.
    pub fn unique_column(&self) -> Option<&str> {
        match self {
            DbError::UniqueViolation {
                constraint: Some(constraint),
                ..
            } => constraint.rsplit('.').next(),
            _ => None,
        }
    }

    /// Re-applied DDL: the statement's effect is already present.
    pub fn is_already_applied(&self) -> bool {
        matches!(self, DbError::AlreadyExists { .. } | DbError::DuplicateColumn { .. })
    }

    /// The schema the statement expects is not the schema the store has.
    pub fn is_schema_drift(&self) -> bool {
        matches!(self, DbError::NoSuchTable { .. } | DbError::NoSuchColumn { .. })
    }
}

/// Convert from sqlx::Error using the message classification table, falling back to sqlx's own
/// categorization for unique violations.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if let Some(classified) = DbError::from_message(db_err.message()) {
                    classified
                } else if db_err.is_unique_violation() {
                    DbError::UniqueViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else {
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Configuration(_) => {
                DbError::Unavailable(err.to_string())
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
