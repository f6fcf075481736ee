//! Idempotent schema creation
//!
//! Creates any missing table at startup. Existing tables are left alone:
//! no column renames, no type changes.

use sqlx::SqlitePool;
use tracing::{debug, info};

/// Result of a schema sync operation
#[derive(Debug, Default)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
}

/// Table name and its DDL, in foreign key dependency order
const TABLES: &[(&str, &str)] = &[
    (
        "categories",
        "CREATE TABLE categories (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL UNIQUE
        )",
    ),
    (
        "media_files",
        "CREATE TABLE media_files (
            id TEXT PRIMARY KEY NOT NULL,
            filename TEXT NOT NULL,
            codec TEXT NOT NULL,
            duration REAL NOT NULL,
            size INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "audios",
        "CREATE TABLE audios (
            id TEXT PRIMARY KEY NOT NULL,
            media_file_id TEXT NOT NULL REFERENCES media_files(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            filename TEXT NOT NULL,
            language TEXT NOT NULL,
            codec TEXT NOT NULL,
            bitrate INTEGER NOT NULL
        )",
    ),
    (
        "subtitles",
        "CREATE TABLE subtitles (
            id TEXT PRIMARY KEY NOT NULL,
            media_file_id TEXT NOT NULL REFERENCES media_files(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            filename TEXT NOT NULL,
            language TEXT NOT NULL,
            codec TEXT NOT NULL
        )",
    ),
    (
        "movies",
        "CREATE TABLE movies (
            id INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            release_date TEXT NOT NULL,
            media_file_id TEXT REFERENCES media_files(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "movie_categories",
        "CREATE TABLE movie_categories (
            movie_id INTEGER NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            category_id TEXT NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
            PRIMARY KEY (movie_id, category_id)
        )",
    ),
    (
        "tv_shows",
        "CREATE TABLE tv_shows (
            id INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            release_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "tv_show_categories",
        "CREATE TABLE tv_show_categories (
            tv_show_id INTEGER NOT NULL REFERENCES tv_shows(id) ON DELETE CASCADE,
            category_id TEXT NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
            PRIMARY KEY (tv_show_id, category_id)
        )",
    ),
    (
        "episodes",
        "CREATE TABLE episodes (
            id INTEGER PRIMARY KEY NOT NULL,
            tv_show_id INTEGER NOT NULL REFERENCES tv_shows(id) ON DELETE CASCADE,
            nb_season INTEGER NOT NULL,
            nb_episode INTEGER NOT NULL,
            name TEXT NOT NULL,
            release_date TEXT NOT NULL,
            media_file_id TEXT REFERENCES media_files(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
];

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Create every missing table. Safe to run on each startup.
pub async fn sync_schema(pool: &SqlitePool) -> anyhow::Result<SchemaSyncResult> {
    let mut result = SchemaSyncResult::default();

    for (name, ddl) in TABLES {
        if table_exists(pool, name).await? {
            debug!(table = name, "Table already exists");
            continue;
        }

        sqlx::query(ddl).execute(pool).await?;
        info!(table = name, "Created table");
        result.tables_created.push(name.to_string());
    }

    Ok(result)
}
