//! Movie database repository

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};

/// Movie record from database, keyed by its TMDB id
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MovieRecord {
    pub id: i64,
    pub name: String,
    pub release_date: NaiveDate,
    pub media_file_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting or replacing a movie
#[derive(Debug, Clone)]
pub struct UpsertMovie {
    pub id: i64,
    pub name: String,
    pub release_date: NaiveDate,
    pub media_file_id: Option<String>,
}

pub struct MovieRepository {
    pool: SqlitePool,
}

impl MovieRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a movie by id
    pub async fn get(&self, id: i64) -> Result<Option<MovieRecord>> {
        let record = sqlx::query_as::<_, MovieRecord>(
            r#"
            SELECT id, name, release_date, media_file_id, created_at, updated_at
            FROM movies WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// List all movies by name
    pub async fn list(&self) -> Result<Vec<MovieRecord>> {
        let records = sqlx::query_as::<_, MovieRecord>(
            r#"
            SELECT id, name, release_date, media_file_id, created_at, updated_at
            FROM movies ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Insert the movie or replace its fields, keeping the original `created_at`
    pub async fn upsert(&self, conn: &mut SqliteConnection, input: &UpsertMovie) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO movies (id, name, release_date, media_file_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                release_date = excluded.release_date,
                media_file_id = excluded.media_file_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(input.id)
        .bind(&input.name)
        .bind(input.release_date)
        .bind(&input.media_file_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Replace the category links of a movie
    pub async fn set_categories(
        &self,
        conn: &mut SqliteConnection,
        movie_id: i64,
        category_ids: &[String],
    ) -> Result<()> {
        sqlx::query("DELETE FROM movie_categories WHERE movie_id = ?")
            .bind(movie_id)
            .execute(&mut *conn)
            .await?;

        for category_id in category_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO movie_categories (movie_id, category_id) VALUES (?, ?)",
            )
            .bind(movie_id)
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Total number of movies
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
