//! Media file repository
//!
//! A media file row describes one transcoded output: the video stream plus
//! its extracted audio and subtitle tracks (`audios` / `subtitles`, deleted
//! with their parent).

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Media file record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MediaFileRecord {
    pub id: String,
    pub filename: String,
    pub codec: String,
    pub duration: f64,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

/// Audio track record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AudioRecord {
    pub id: String,
    pub media_file_id: String,
    pub position: i64,
    pub filename: String,
    pub language: String,
    pub codec: String,
    pub bitrate: i64,
}

/// Subtitle track record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubtitleRecord {
    pub id: String,
    pub media_file_id: String,
    pub position: i64,
    pub filename: String,
    pub language: String,
    pub codec: String,
}

/// Input for creating an audio track
#[derive(Debug, Clone)]
pub struct CreateAudio {
    pub filename: String,
    pub language: String,
    pub codec: String,
    pub bitrate: i64,
}

/// Input for creating a subtitle track
#[derive(Debug, Clone)]
pub struct CreateSubtitle {
    pub filename: String,
    pub language: String,
    pub codec: String,
}

/// Input for creating a media file with its tracks
#[derive(Debug, Clone)]
pub struct CreateMediaFile {
    pub filename: String,
    pub codec: String,
    pub duration: f64,
    pub size: i64,
    pub audios: Vec<CreateAudio>,
    pub subtitles: Vec<CreateSubtitle>,
}

pub struct MediaFileRepository {
    pool: SqlitePool,
}

impl MediaFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a media file by id
    pub async fn get(&self, id: &str) -> Result<Option<MediaFileRecord>> {
        let record = sqlx::query_as::<_, MediaFileRecord>(
            "SELECT id, filename, codec, duration, size, created_at FROM media_files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert a media file and its tracks, returning the new id
    pub async fn create(&self, conn: &mut SqliteConnection, input: &CreateMediaFile) -> Result<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO media_files (id, filename, codec, duration, size, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.filename)
        .bind(&input.codec)
        .bind(input.duration)
        .bind(input.size)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        for (position, audio) in input.audios.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO audios (id, media_file_id, position, filename, language, codec, bitrate)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(position as i64)
            .bind(&audio.filename)
            .bind(&audio.language)
            .bind(&audio.codec)
            .bind(audio.bitrate)
            .execute(&mut *conn)
            .await?;
        }

        for (position, subtitle) in input.subtitles.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO subtitles (id, media_file_id, position, filename, language, codec)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(position as i64)
            .bind(&subtitle.filename)
            .bind(&subtitle.language)
            .bind(&subtitle.codec)
            .execute(&mut *conn)
            .await?;
        }

        Ok(id)
    }

    /// Delete a media file in its own transaction. Tracks cascade and the
    /// owning movie/episode reference is cleared.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM media_files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Audio tracks of a media file, in stream order
    pub async fn list_audios(&self, media_file_id: &str) -> Result<Vec<AudioRecord>> {
        let records = sqlx::query_as::<_, AudioRecord>(
            r#"
            SELECT id, media_file_id, position, filename, language, codec, bitrate
            FROM audios WHERE media_file_id = ? ORDER BY position
            "#,
        )
        .bind(media_file_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Subtitle tracks of a media file, in stream order
    pub async fn list_subtitles(&self, media_file_id: &str) -> Result<Vec<SubtitleRecord>> {
        let records = sqlx::query_as::<_, SubtitleRecord>(
            r#"
            SELECT id, media_file_id, position, filename, language, codec
            FROM subtitles WHERE media_file_id = ? ORDER BY position
            "#,
        )
        .bind(media_file_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Total number of media files
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_files")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
