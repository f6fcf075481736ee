//! Episode database repository

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};

/// Episode record from database, keyed by its TMDB id
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EpisodeRecord {
    pub id: i64,
    pub tv_show_id: i64,
    pub nb_season: i64,
    pub nb_episode: i64,
    pub name: String,
    pub release_date: NaiveDate,
    pub media_file_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting or replacing an episode
#[derive(Debug, Clone)]
pub struct UpsertEpisode {
    pub id: i64,
    pub tv_show_id: i64,
    pub nb_season: i64,
    pub nb_episode: i64,
    pub name: String,
    pub release_date: NaiveDate,
    pub media_file_id: Option<String>,
}

pub struct EpisodeRepository {
    pool: SqlitePool,
}

impl EpisodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get an episode by id
    pub async fn get(&self, id: i64) -> Result<Option<EpisodeRecord>> {
        let record = sqlx::query_as::<_, EpisodeRecord>(
            r#"
            SELECT id, tv_show_id, nb_season, nb_episode, name, release_date,
                   media_file_id, created_at, updated_at
            FROM episodes WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// List the episodes of a show in season/episode order
    pub async fn list_by_show(&self, tv_show_id: i64) -> Result<Vec<EpisodeRecord>> {
        let records = sqlx::query_as::<_, EpisodeRecord>(
            r#"
            SELECT id, tv_show_id, nb_season, nb_episode, name, release_date,
                   media_file_id, created_at, updated_at
            FROM episodes WHERE tv_show_id = ?
            ORDER BY nb_season, nb_episode
            "#,
        )
        .bind(tv_show_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Insert the episode or replace its fields, keeping the original `created_at`
    pub async fn upsert(&self, conn: &mut SqliteConnection, input: &UpsertEpisode) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO episodes (id, tv_show_id, nb_season, nb_episode, name, release_date,
                                  media_file_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                tv_show_id = excluded.tv_show_id,
                nb_season = excluded.nb_season,
                nb_episode = excluded.nb_episode,
                name = excluded.name,
                release_date = excluded.release_date,
                media_file_id = excluded.media_file_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(input.id)
        .bind(input.tv_show_id)
        .bind(input.nb_season)
        .bind(input.nb_episode)
        .bind(&input.name)
        .bind(input.release_date)
        .bind(&input.media_file_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Total number of episodes
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM episodes")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
