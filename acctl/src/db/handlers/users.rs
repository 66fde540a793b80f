//! Database repository for users.

use crate::db::{
    errors::Result,
    models::users::{UserCreateDBRequest, UserDBResponse},
};
use crate::types::{abbrev_id, format_timestamp};
use sqlx::SqliteConnection;
use tracing::instrument;

pub struct Users<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Case-insensitive username lookup.
    #[instrument(skip(self), err)]
    pub async fn exists_by_username(&mut self, username: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE LOWER(username) = LOWER(?) LIMIT 1")
            .bind(username)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(found.is_some())
    }

    /// Case-insensitive email lookup.
    #[instrument(skip(self, email), err)]
    pub async fn exists_by_email(&mut self, email: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE LOWER(email) = LOWER(?) LIMIT 1")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(found.is_some())
    }

    /// Insert one account row. `created_at` and `updated_at` are written with the same value.
    #[instrument(skip(self, request), fields(username = %request.username, user_id = %abbrev_id(&request.id)), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let timestamp = format_timestamp(&request.created_at);

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id)
        .bind(&request.username)
        .bind(request.email.as_deref())
        .bind(&request.password_hash)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *self.db)
        .await?;

        Ok(UserDBResponse {
            id: request.id.clone(),
            username: request.username.clone(),
            email: request.email.clone(),
            created_at: request.created_at,
            updated_at: request.created_at,
        })
    }

    pub async fn count(&mut self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use crate::test_utils::apply_test_schema;
    use crate::types::now_millis;
    use sqlx::SqlitePool;

    fn request(id: &str, username: &str, email: Option<&str>) -> UserCreateDBRequest {
        UserCreateDBRequest {
            id: id.to_string(),
            username: username.to_string(),
            email: email.map(str::to_string),
            password_hash: "$argon2id$stub".to_string(),
            created_at: now_millis(),
        }
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_create_and_lookup_case_insensitively(pool: SqlitePool) {
        apply_test_schema(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo
            .create(&request("u-1", "Alice_01", Some("Alice@Example.com")))
            .await
            .unwrap();
        assert_eq!(created.created_at, created.updated_at);

        assert!(repo.exists_by_username("alice_01").await.unwrap());
        assert!(repo.exists_by_username("ALICE_01").await.unwrap());
        assert!(repo.exists_by_email("alice@example.com").await.unwrap());
        assert!(!repo.exists_by_email("bob@example.com").await.unwrap());

        let fetched = sqlx::query_as::<_, UserDBResponse>(
            "SELECT id, username, email, created_at, updated_at FROM users WHERE username = 'ALICE_01'",
        )
        .fetch_one(&mut *conn)
        .await
        .unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.username, "Alice_01");
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_duplicate_username_is_unique_violation(pool: SqlitePool) {
        apply_test_schema(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&request("u-1", "carol", None)).await.unwrap();
        let err = repo.create(&request("u-2", "CAROL", None)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }), "got {err:?}");
        assert_eq!(err.unique_column(), Some("username"));
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_null_emails_never_collide(pool: SqlitePool) {
        apply_test_schema(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&request("u-1", "dave", None)).await.unwrap();
        repo.create(&request("u-2", "erin", None)).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_missing_table_is_schema_drift(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let err = Users::new(&mut conn).exists_by_username("anyone").await.unwrap_err();
        assert!(matches!(err, DbError::NoSuchTable { ref table, .. } if table.as_deref() == Some("users")));
    }
}
