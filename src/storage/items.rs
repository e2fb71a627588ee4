use anyhow::Result;

use super::schema::Database;
use super::types::{Item, NewItem};

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Insert an item unless `(feed_id, guid)` already exists.
    ///
    /// Returns `(item_id, inserted)`. Duplicates are not an error: the
    /// existing row is left untouched and `inserted` is `false`.
    pub async fn add_item(&self, item: &NewItem) -> Result<(i64, bool)> {
        let result = sqlx::query(
            r#"
            INSERT INTO items
                (feed_id, guid, title, content, link, published_at, fetched_at, is_read)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(feed_id, guid) DO NOTHING
        "#,
        )
        .bind(item.feed_id)
        .bind(&item.guid)
        .bind(&item.title)
        .bind(&item.content)
        .bind(&item.link)
        .bind(item.published_at)
        .bind(item.fetched_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok((result.last_insert_rowid(), true));
        }

        let (id,): (i64,) = sqlx::query_as("SELECT id FROM items WHERE feed_id = ? AND guid = ?")
            .bind(item.feed_id)
            .bind(&item.guid)
            .fetch_one(&self.pool)
            .await?;
        Ok((id, false))
    }

    /// Items for one feed, newest first.
    pub async fn get_items(&self, feed_id: i64, only_unread: bool) -> Result<Vec<Item>> {
        let query = if only_unread {
            "SELECT id, feed_id, guid, title, content, link, published_at, fetched_at, is_read \
             FROM items WHERE feed_id = ? AND is_read = 0 ORDER BY published_at DESC, id DESC"
        } else {
            "SELECT id, feed_id, guid, title, content, link, published_at, fetched_at, is_read \
             FROM items WHERE feed_id = ? ORDER BY published_at DESC, id DESC"
        };
        let items = sqlx::query_as::<_, Item>(query)
            .bind(feed_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    pub async fn mark_item_read(&self, item_id: i64) -> Result<()> {
        sqlx::query("UPDATE items SET is_read = 1 WHERE id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of unread items per feed, for feeds that have any.
    pub async fn unread_counts(&self) -> Result<Vec<(i64, i64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT feed_id, COUNT(*) FROM items WHERE is_read = 0 \
             GROUP BY feed_id ORDER BY feed_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewItem};
    use chrono::{TimeZone, Utc};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_item(feed_id: i64, guid: &str) -> NewItem {
        NewItem {
            feed_id,
            guid: guid.to_string(),
            title: format!("Item {}", guid),
            content: "Body".to_string(),
            link: Some(format!("https://example.com/{}", guid)),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_add_item_reports_duplicates() {
        let db = test_db().await;
        let (feed_id, _) = db
            .insert_feed("https://example.com/rss", None, None)
            .await
            .unwrap();

        let (id1, inserted) = db.add_item(&test_item(feed_id, "g1")).await.unwrap();
        assert!(inserted);
        let (id2, inserted) = db.add_item(&test_item(feed_id, "g1")).await.unwrap();
        assert!(!inserted);
        assert_eq!(id1, id2);

        let items = db.get_items(feed_id, false).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(!items[0].is_read);
    }

    #[tokio::test]
    async fn test_same_guid_in_different_feeds_is_not_duplicate() {
        let db = test_db().await;
        let (a, _) = db.insert_feed("https://a.example/rss", None, None).await.unwrap();
        let (b, _) = db.insert_feed("https://b.example/rss", None, None).await.unwrap();

        assert!(db.add_item(&test_item(a, "shared")).await.unwrap().1);
        assert!(db.add_item(&test_item(b, "shared")).await.unwrap().1);
    }

    #[tokio::test]
    async fn test_mark_read_and_unread_counts() {
        let db = test_db().await;
        let (feed_id, _) = db
            .insert_feed("https://example.com/rss", None, None)
            .await
            .unwrap();
        let (first, _) = db.add_item(&test_item(feed_id, "g1")).await.unwrap();
        db.add_item(&test_item(feed_id, "g2")).await.unwrap();

        db.mark_item_read(first).await.unwrap();

        assert_eq!(db.get_items(feed_id, true).await.unwrap().len(), 1);
        assert_eq!(db.unread_counts().await.unwrap(), vec![(feed_id, 1)]);
    }

    #[tokio::test]
    async fn test_delete_feed_cascades_items() {
        let db = test_db().await;
        let (feed_id, _) = db
            .insert_feed("https://example.com/rss", None, None)
            .await
            .unwrap();
        db.add_item(&test_item(feed_id, "g1")).await.unwrap();

        assert!(db.delete_feed(feed_id).await.unwrap());
        assert!(db.get_items(feed_id, false).await.unwrap().is_empty());
    }
}
