//! Working out which field of a registration collides with an existing account.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::Users;
use crate::types::ConflictField;
use sqlx::SqliteConnection;
use tracing::{debug, instrument};

pub struct ConflictResolver<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> ConflictResolver<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Username first, then email when one was supplied. Each is an independent query.
    #[instrument(skip(self, email), err)]
    pub async fn which_field_conflicts(&mut self, username: &str, email: Option<&str>) -> Result<Option<ConflictField>> {
        let mut users = Users::new(&mut *self.db);
        if users.exists_by_username(username).await? {
            return Ok(Some(ConflictField::Username));
        }
        if let Some(email) = email {
            if users.exists_by_email(email).await? {
                return Ok(Some(ConflictField::Email));
            }
        }
        Ok(None)
    }

    /// Explain a uniqueness violation raised by the insert.
    ///
    /// Re-runs the existence checks; when they find nothing (the competing row vanished or the
    /// check itself failed) the column named in the store message decides. `None` means the
    /// violation could not be attributed to either field.
    #[instrument(skip(self, violation, email))]
    pub async fn resolve_violation(&mut self, violation: &DbError, username: &str, email: Option<&str>) -> Option<ConflictField> {
        match self.which_field_conflicts(username, email).await {
            Ok(Some(field)) => return Some(field),
            Ok(None) => debug!("Re-query found no conflicting account"),
            Err(e) => debug!(error = %e, "Re-query after uniqueness violation failed"),
        }

        match violation.unique_column() {
            Some(column) if column.eq_ignore_ascii_case("username") => Some(ConflictField::Username),
            Some(column) if column.eq_ignore_ascii_case("email") => Some(ConflictField::Email),
            _ => None,
        }
    }
}
