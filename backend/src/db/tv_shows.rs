//! TV show database repository
//!
//! A show row is created once per TMDB id, the first time one of its
//! episodes is indexed, and reused afterwards.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};

/// TV show record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TvShowRecord {
    pub id: i64,
    pub name: String,
    pub release_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a TV show
#[derive(Debug, Clone)]
pub struct CreateTvShow {
    pub id: i64,
    pub name: String,
    pub release_date: NaiveDate,
}

pub struct TvShowRepository {
    pool: SqlitePool,
}

impl TvShowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a TV show by id
    pub async fn get(&self, id: i64) -> Result<Option<TvShowRecord>> {
        let record = sqlx::query_as::<_, TvShowRecord>(
            "SELECT id, name, release_date, created_at, updated_at FROM tv_shows WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert the show unless it already exists. Returns true when a row was created.
    pub async fn create_if_missing(
        &self,
        conn: &mut SqliteConnection,
        input: &CreateTvShow,
    ) -> Result<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO tv_shows (id, name, release_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(input.id)
        .bind(&input.name)
        .bind(input.release_date)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the category links of a show
    pub async fn set_categories(
        &self,
        conn: &mut SqliteConnection,
        tv_show_id: i64,
        category_ids: &[String],
    ) -> Result<()> {
        sqlx::query("DELETE FROM tv_show_categories WHERE tv_show_id = ?")
            .bind(tv_show_id)
            .execute(&mut *conn)
            .await?;

        for category_id in category_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO tv_show_categories (tv_show_id, category_id) VALUES (?, ?)",
            )
            .bind(tv_show_id)
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Total number of shows
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tv_shows")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
