//! The storage surface the fetcher depends on.
//!
//! The fetcher is generic over [`FeedStore`] so it can run against any
//! backend. Backends that cannot absorb concurrent writers report
//! `supports_high_concurrency() == false`, which makes the fetcher dispatch
//! feeds one at a time.
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::future::Future;

use super::schema::Database;
use super::types::{Feed, NewItem};

pub trait FeedStore: Clone + Send + Sync + 'static {
    fn list_feeds(&self) -> impl Future<Output = Result<Vec<Feed>>> + Send;

    fn record_fetch_error(
        &self,
        feed_id: i64,
        message: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Set the last-fetched timestamp and clear the stored error.
    fn record_fetch_success(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_feed_title(
        &self,
        feed_id: i64,
        title: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Returns `(item_id, inserted)`; `inserted` is false for duplicates.
    fn insert_item_if_absent(
        &self,
        item: &NewItem,
    ) -> impl Future<Output = Result<(i64, bool)>> + Send;

    /// Defaulted and floor-clamped by the backend.
    fn polling_interval_minutes(&self) -> impl Future<Output = Result<u32>> + Send;

    fn supports_high_concurrency(&self) -> bool;
}

impl FeedStore for Database {
    async fn list_feeds(&self) -> Result<Vec<Feed>> {
        self.get_feeds().await
    }

    async fn record_fetch_error(&self, feed_id: i64, message: &str) -> Result<()> {
        self.set_feed_error(feed_id, message).await
    }

    async fn record_fetch_success(&self, feed_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.update_feed_fetched(feed_id, at).await
    }

    async fn update_feed_title(&self, feed_id: i64, title: &str) -> Result<()> {
        self.set_feed_title(feed_id, title).await
    }

    async fn insert_item_if_absent(&self, item: &NewItem) -> Result<(i64, bool)> {
        self.add_item(item).await
    }

    async fn polling_interval_minutes(&self) -> Result<u32> {
        self.get_polling_interval().await
    }

    /// SQLite allows a single writer at a time.
    fn supports_high_concurrency(&self) -> bool {
        false
    }
}
