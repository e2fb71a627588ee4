use anyhow::Result;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{Feed, Folder};

const FEED_COLUMNS: &str =
    "id, folder_id, title, url, last_fetched, NULLIF(last_error, '') AS last_error";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Subscribe to a feed, returning `(feed_id, created)`.
    ///
    /// Subscribing to an existing URL is a no-op that returns the existing id.
    /// Without an explicit title the URL is stored as a placeholder, which the
    /// fetcher replaces with the origin's title on the first successful fetch.
    pub async fn insert_feed(
        &self,
        url: &str,
        title: Option<&str>,
        folder_id: Option<i64>,
    ) -> Result<(i64, bool)> {
        let title = title.filter(|t| !t.trim().is_empty()).unwrap_or(url);
        let result = sqlx::query(
            "INSERT INTO feeds (folder_id, title, url) VALUES (?, ?, ?) \
             ON CONFLICT(url) DO NOTHING",
        )
        .bind(folder_id)
        .bind(title)
        .bind(url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok((result.last_insert_rowid(), true));
        }

        let (id,): (i64,) = sqlx::query_as("SELECT id FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok((id, false))
    }

    /// All feeds ordered by title.
    pub async fn get_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY title COLLATE NOCASE, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Delete a feed; its items cascade.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the message of the most recent failed fetch.
    pub async fn set_feed_error(&self, feed_id: i64, message: &str) -> Result<()> {
        sqlx::query("UPDATE feeds SET last_error = ? WHERE id = ?")
            .bind(message)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Update the last_fetched timestamp and clear any stored error.
    pub async fn update_feed_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE feeds SET last_fetched = ?, last_error = '' WHERE id = ?")
            .bind(at)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_feed_title(&self, feed_id: i64, title: &str) -> Result<()> {
        sqlx::query("UPDATE feeds SET title = ? WHERE id = ?")
            .bind(title)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Folder Operations
    // ========================================================================

    /// Get or create a folder by name.
    pub async fn get_or_create_folder(&self, name: &str) -> Result<i64> {
        sqlx::query("INSERT OR IGNORE INTO folders (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM folders WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn get_folders(&self) -> Result<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>("SELECT id, name FROM folders ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(folders)
    }
}
