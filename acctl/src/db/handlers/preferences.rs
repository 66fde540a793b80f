//! Database repository for preference rows.
//!
//! Depending on which migrations ran, `user_preferences` may or may not carry the `tag_layout`
//! and `sort_by` columns. Inserts are therefore described as [`PreferenceShape`]s, ordered from
//! richest to most basic, and the caller picks the next shape when the store rejects a column.

use crate::config::PreferenceDefaults;
use crate::db::errors::Result;
use crate::types::{abbrev_id, format_timestamp};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::instrument;

/// An optional or mandatory preference column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceColumn {
    Theme,
    PageSize,
    ViewMode,
    Density,
    TagLayout,
    SortBy,
}

impl PreferenceColumn {
    pub fn name(&self) -> &'static str {
        match self {
            PreferenceColumn::Theme => "theme",
            PreferenceColumn::PageSize => "page_size",
            PreferenceColumn::ViewMode => "view_mode",
            PreferenceColumn::Density => "density",
            PreferenceColumn::TagLayout => "tag_layout",
            PreferenceColumn::SortBy => "sort_by",
        }
    }
}

/// Column set of one candidate insert. `user_id` and `updated_at` are always written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferenceShape {
    pub name: &'static str,
    pub columns: &'static [PreferenceColumn],
}

pub const FULL_SHAPE: PreferenceShape = PreferenceShape {
    name: "full",
    columns: &[
        PreferenceColumn::Theme,
        PreferenceColumn::PageSize,
        PreferenceColumn::ViewMode,
        PreferenceColumn::Density,
        PreferenceColumn::TagLayout,
        PreferenceColumn::SortBy,
    ],
};

pub const BASIC_SHAPE: PreferenceShape = PreferenceShape {
    name: "basic",
    columns: &[
        PreferenceColumn::Theme,
        PreferenceColumn::PageSize,
        PreferenceColumn::ViewMode,
        PreferenceColumn::Density,
    ],
};

/// Candidate shapes, tried in order.
pub const PREFERENCE_SHAPES: &[PreferenceShape] = &[FULL_SHAPE, BASIC_SHAPE];

impl PreferenceShape {
    pub fn insert_sql(&self) -> String {
        let mut names = vec!["user_id"];
        names.extend(self.columns.iter().map(PreferenceColumn::name));
        names.push("updated_at");
        let placeholders = vec!["?"; names.len()].join(", ");
        format!("INSERT INTO user_preferences ({}) VALUES ({placeholders})", names.join(", "))
    }

    pub fn includes(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name().eq_ignore_ascii_case(column))
    }
}

pub struct Preferences<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Preferences<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, values, updated_at), fields(shape = shape.name, user_id = %abbrev_id(user_id)), err)]
    pub async fn create(
        &mut self,
        shape: &PreferenceShape,
        user_id: &str,
        values: &PreferenceDefaults,
        updated_at: &DateTime<Utc>,
    ) -> Result<()> {
        let sql = shape.insert_sql();
        let mut query = sqlx::query(&sql).bind(user_id);
        for column in shape.columns {
            query = match column {
                PreferenceColumn::Theme => query.bind(&values.theme),
                PreferenceColumn::PageSize => query.bind(values.page_size),
                PreferenceColumn::ViewMode => query.bind(&values.view_mode),
                PreferenceColumn::Density => query.bind(&values.density),
                PreferenceColumn::TagLayout => query.bind(&values.tag_layout),
                PreferenceColumn::SortBy => query.bind(&values.sort_by),
            };
        }
        query.bind(format_timestamp(updated_at)).execute(&mut *self.db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use crate::test_utils::{apply_test_schema, apply_test_schema_through, insert_bare_user};
    use crate::types::now_millis;
    use sqlx::SqlitePool;

    #[test]
    fn test_insert_sql_lists_shape_columns() {
        assert_eq!(
            BASIC_SHAPE.insert_sql(),
            "INSERT INTO user_preferences (user_id, theme, page_size, view_mode, density, updated_at) VALUES (?, ?, ?, ?, ?, ?)"
        );
        assert!(FULL_SHAPE.insert_sql().contains("tag_layout, sort_by, updated_at"));
        assert!(FULL_SHAPE.includes("sort_by"));
        assert!(!BASIC_SHAPE.includes("tag_layout"));
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_full_shape_on_current_schema(pool: SqlitePool) {
        apply_test_schema(&pool).await;
        insert_bare_user(&pool, "u-1", "frank").await;
        let mut conn = pool.acquire().await.unwrap();

        let defaults = PreferenceDefaults::default();
        Preferences::new(&mut conn)
            .create(&FULL_SHAPE, "u-1", &defaults, &now_millis())
            .await
            .unwrap();

        let (layout, sort): (String, String) =
            sqlx::query_as("SELECT tag_layout, sort_by FROM user_preferences WHERE user_id = 'u-1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(layout, "grid");
        assert_eq!(sort, "popular");
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_full_shape_on_old_schema_names_missing_column(pool: SqlitePool) {
        apply_test_schema_through(&pool, 1).await;
        insert_bare_user(&pool, "u-1", "grace").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Preferences::new(&mut conn);

        let err = repo
            .create(&FULL_SHAPE, "u-1", &PreferenceDefaults::default(), &now_millis())
            .await
            .unwrap_err();
        match err {
            DbError::NoSuchColumn { column, .. } => assert_eq!(column.as_deref(), Some("tag_layout")),
            other => panic!("unexpected error: {other:?}"),
        }

        repo.create(&BASIC_SHAPE, "u-1", &PreferenceDefaults::default(), &now_millis())
            .await
            .unwrap();
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_preferences WHERE user_id = 'u-1'")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }
}
