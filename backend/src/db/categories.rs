//! Category (genre) repository
//!
//! Categories are unique by name and shared between movies and TV shows.

use anyhow::Result;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Category record from database
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
}

pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Return the id of the category named `name`, inserting it when missing
    pub async fn get_or_create(&self, conn: &mut SqliteConnection, name: &str) -> Result<String> {
        sqlx::query("INSERT INTO categories (id, name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(Uuid::new_v4().to_string())
            .bind(name)
            .execute(&mut *conn)
            .await?;

        let (id,): (String,) = sqlx::query_as("SELECT id FROM categories WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;

        Ok(id)
    }

    /// List all categories by name
    pub async fn list(&self) -> Result<Vec<CategoryRecord>> {
        let records = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, name FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Category names linked to a movie
    pub async fn list_for_movie(&self, movie_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT c.name FROM categories c
            JOIN movie_categories mc ON mc.category_id = c.id
            WHERE mc.movie_id = ?
            ORDER BY c.name
            "#,
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Category names linked to a TV show
    pub async fn list_for_tv_show(&self, tv_show_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT c.name FROM categories c
            JOIN tv_show_categories tc ON tc.category_id = c.id
            WHERE tc.tv_show_id = ?
            ORDER BY c.name
            "#,
        )
        .bind(tv_show_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_get_or_create_is_unique_by_name() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.categories();

        let mut tx = db.pool().begin().await.unwrap();
        let first = repo.get_or_create(&mut tx, "Drama").await.unwrap();
        let second = repo.get_or_create(&mut tx, "Drama").await.unwrap();
        let other = repo.get_or_create(&mut tx, "Comedy").await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);

        let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Comedy", "Drama"]);
    }
}
