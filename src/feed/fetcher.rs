use crate::config::Config;
use crate::feed::limiter::{origin_of, OriginLimiter};
use crate::feed::parser::{parse_feed, ParsedFeed};
use crate::storage::{Feed, FeedStore, NewItem};
use crate::util::truncate_chars;
use chrono::Utc;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Longest error message stored on a feed record.
pub const MAX_ERROR_LEN: usize = 200;

const PROGRESS_EVERY: usize = 50;

/// Errors that can occur during feed fetching operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Cancelled while waiting for an origin slot or the spacing delay
    #[error("Rate limit wait cancelled for {0}")]
    RateLimitCancelled(String),
    /// Network-level error (DNS, connection, TLS, invalid URL, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Cancelled while the request was in flight
    #[error("Request cancelled")]
    Cancelled,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Feed document could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Storage failed where the caller cannot continue without it
    #[error("Storage error: {0}")]
    Storage(String),
    /// The batch stopped before every feed was dispatched
    #[error("Batch cancelled after {dispatched}/{total} feeds")]
    BatchCancelled { dispatched: usize, total: usize },
}

impl FetchError {
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimitCancelled(_)
                | FetchError::Cancelled
                | FetchError::BatchCancelled { .. }
        )
    }
}

/// Result of a single feed fetch inside a batch.
pub struct FetchResult {
    pub feed_id: i64,
    pub result: Result<usize, FetchError>,
}

/// What a batch achieved.
///
/// `new_items` only covers feeds that completed without error, so
/// `attempted - new_items.len()` is the number of failed feeds.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub new_items: HashMap<i64, usize>,
    pub total: usize,
    pub attempted: usize,
    /// Set when the batch was cancelled before every feed was dispatched.
    /// `new_items` still holds everything gathered up to that point.
    pub error: Option<FetchError>,
}

impl BatchOutcome {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn total_new_items(&self) -> usize {
        self.new_items.values().sum()
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.new_items.len()
    }

    pub fn into_result(self) -> Result<HashMap<i64, usize>, FetchError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.new_items),
        }
    }
}

/// Fetches feeds into a [`FeedStore`], politely.
///
/// Cheap to clone: clones share the HTTP client and the origin limiter.
#[derive(Clone)]
pub struct Fetcher<S> {
    store: S,
    client: reqwest::Client,
    limiter: Arc<OriginLimiter>,
    workers: usize,
    request_timeout: Duration,
    max_feed_bytes: usize,
}

impl<S: FeedStore> Fetcher<S> {
    /// Build a fetcher whose worker count follows the store's capability flag.
    pub fn new(store: S, config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        let workers = config.workers_for(store.supports_high_concurrency());

        tracing::debug!(
            workers = workers,
            per_origin = config.per_origin_concurrency,
            "Fetcher configured"
        );

        Ok(Self {
            store,
            client,
            limiter: Arc::new(OriginLimiter::new(
                config.per_origin_concurrency,
                config.origin_spacing(),
            )),
            workers,
            request_timeout: config.request_timeout(),
            max_feed_bytes: config.max_feed_bytes,
        })
    }

    /// Override the worker count chosen from the capability flag.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<OriginLimiter> {
        &self.limiter
    }

    /// Fetch one feed and store its new entries.
    ///
    /// Returns the number of newly inserted items. Retrieval and parse
    /// failures are recorded on the feed (truncated to [`MAX_ERROR_LEN`]
    /// characters) and returned; per-item storage failures are logged and
    /// skipped. Nothing is retried.
    ///
    /// # Errors
    ///
    /// - [`FetchError::RateLimitCancelled`] - `cancel` fired before an origin
    ///   slot was obtained; storage is untouched
    /// - [`FetchError::Network`], [`FetchError::HttpStatus`],
    ///   [`FetchError::Timeout`], [`FetchError::Cancelled`],
    ///   [`FetchError::ResponseTooLarge`], [`FetchError::IncompleteResponse`],
    ///   [`FetchError::Parse`] - retrieval or parse failure
    pub async fn fetch_one(
        &self,
        feed: &Feed,
        cancel: &CancellationToken,
    ) -> Result<usize, FetchError> {
        let origin = origin_of(&feed.url);
        // Held until return, so the slot is released on every path below.
        let _permit = self
            .limiter
            .acquire(&origin, cancel)
            .await
            .map_err(|_| FetchError::RateLimitCancelled(feed.url.clone()))?;

        let parsed = match self.retrieve(&feed.url, cancel).await {
            Ok(parsed) => parsed,
            Err(e) => {
                let message = e.to_string();
                let message = truncate_chars(&message, MAX_ERROR_LEN);
                if let Err(db_err) = self.store.record_fetch_error(feed.id, &message).await {
                    tracing::warn!(
                        feed_id = feed.id,
                        error = %db_err,
                        "Failed to record feed error"
                    );
                }
                tracing::warn!(feed_id = feed.id, url = %feed.url, error = %e, "Feed fetch failed");
                return Err(e);
            }
        };

        self.maybe_update_title(feed, &parsed.title).await;

        let now = Utc::now();
        let mut new_count = 0;
        let mut skipped = 0;
        for entry in &parsed.entries {
            let Some(guid) = entry.dedup_key() else {
                skipped += 1;
                continue;
            };
            let item = NewItem {
                feed_id: feed.id,
                guid: guid.to_string(),
                title: entry.title.clone(),
                content: entry.body().to_string(),
                link: entry.link.clone(),
                published_at: entry.published.unwrap_or(now),
                fetched_at: now,
            };
            match self.store.insert_item_if_absent(&item).await {
                Ok((_, true)) => new_count += 1,
                Ok((_, false)) => {}
                Err(e) => {
                    tracing::warn!(
                        feed_id = feed.id,
                        guid = %item.guid,
                        error = %e,
                        "Failed to store item"
                    );
                }
            }
        }

        if skipped > 0 {
            tracing::debug!(
                feed_id = feed.id,
                skipped = skipped,
                "Entries without GUID or link skipped"
            );
        }

        if let Err(e) = self.store.record_fetch_success(feed.id, now).await {
            tracing::warn!(feed_id = feed.id, error = %e, "Failed to update last fetched time");
        }

        tracing::debug!(feed_id = feed.id, new_items = new_count, "Feed fetched");
        Ok(new_count)
    }

    /// Replace a URL placeholder title with the one the origin supplies.
    async fn maybe_update_title(&self, feed: &Feed, parsed_title: &str) {
        if parsed_title.is_empty() || parsed_title == feed.title || feed.title != feed.url {
            return;
        }
        match self.store.update_feed_title(feed.id, parsed_title).await {
            Ok(()) => {
                tracing::info!(
                    feed_id = feed.id,
                    url = %feed.url,
                    title = %parsed_title,
                    "Updated feed title"
                )
            }
            Err(e) => {
                tracing::warn!(feed_id = feed.id, error = %e, "Failed to update feed title")
            }
        }
    }

    async fn retrieve(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ParsedFeed, FetchError> {
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = tokio::time::timeout(self.request_timeout, self.download(url)) => {
                result.map_err(|_| FetchError::Timeout)??
            }
        };

        parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_feed_bytes).await
    }

    /// List every feed from the store and fetch them with the configured
    /// worker count.
    pub async fn refresh_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, FetchError> {
        let feeds = self
            .store
            .list_feeds()
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;
        Ok(self.fetch_all(feeds, cancel).await)
    }

    /// Fetch a batch of feeds with the configured worker count.
    pub async fn fetch_all(&self, feeds: Vec<Feed>, cancel: &CancellationToken) -> BatchOutcome {
        self.fetch_all_with(feeds, self.workers, cancel).await
    }

    /// Fetch a batch of feeds.
    ///
    /// `max_workers <= 1` fetches strictly in input order; otherwise exactly
    /// `max_workers` workers pull from a shared queue and results arrive in
    /// completion order. Individual feed failures never abort the batch.
    /// Cancellation is checked before each feed is taken on; fetches already
    /// in flight finish on their own cancellation-aware paths.
    pub async fn fetch_all_with(
        &self,
        feeds: Vec<Feed>,
        max_workers: usize,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        if feeds.is_empty() {
            return BatchOutcome::default();
        }

        tracing::info!(feeds = feeds.len(), workers = max_workers, "Fetching feeds");

        let outcome = if max_workers <= 1 {
            self.fetch_sequential(feeds, cancel).await
        } else {
            self.fetch_parallel(feeds, max_workers, cancel).await
        };

        tracing::info!(
            attempted = outcome.attempted,
            succeeded = outcome.new_items.len(),
            new_items = outcome.total_new_items(),
            cancelled = outcome.error.is_some(),
            "Batch finished"
        );
        outcome
    }

    async fn fetch_sequential(&self, feeds: Vec<Feed>, cancel: &CancellationToken) -> BatchOutcome {
        let mut outcome = BatchOutcome::new(feeds.len());

        for (i, feed) in feeds.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(dispatched = i, total = outcome.total, "Batch cancelled");
                outcome.error = Some(FetchError::BatchCancelled {
                    dispatched: i,
                    total: outcome.total,
                });
                return outcome;
            }

            outcome.attempted += 1;
            if let Ok(count) = self.fetch_one(feed, cancel).await {
                outcome.new_items.insert(feed.id, count);
            }

            if (i + 1) % PROGRESS_EVERY == 0 {
                tracing::info!(done = i + 1, total = outcome.total, "Fetch progress");
            }
        }

        outcome
    }

    async fn fetch_parallel(
        &self,
        feeds: Vec<Feed>,
        max_workers: usize,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let total = feeds.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(feeds)));
        let (result_tx, mut result_rx) = mpsc::channel::<FetchResult>(total);

        let mut workers = JoinSet::new();
        for worker_id in 0..max_workers {
            let fetcher = self.clone();
            let queue = Arc::clone(&queue);
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        tracing::debug!(worker = worker_id, "Worker stopping: batch cancelled");
                        break;
                    }
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(feed) = next else {
                        break;
                    };

                    let result = fetcher.fetch_one(&feed, &cancel).await;
                    if result_tx
                        .send(FetchResult {
                            feed_id: feed.id,
                            result,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }
        // Workers hold the remaining senders; the stream ends when the last one exits.
        drop(result_tx);

        let mut outcome = BatchOutcome::new(total);
        while let Some(FetchResult { feed_id, result }) = result_rx.recv().await {
            outcome.attempted += 1;
            // Failures were already logged by fetch_one.
            if let Ok(count) = result {
                outcome.new_items.insert(feed_id, count);
            }
            if outcome.attempted % PROGRESS_EVERY == 0 {
                tracing::info!(done = outcome.attempted, total = total, "Fetch progress");
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Fetch worker panicked");
            }
        }

        let undispatched = queue.lock().unwrap_or_else(PoisonError::into_inner).len();
        if undispatched > 0 {
            tracing::info!(
                dispatched = total - undispatched,
                total = total,
                "Batch cancelled"
            );
            outcome.error = Some(FetchError::BatchCancelled {
                dispatched: total - undispatched,
                total,
            });
        }

        outcome
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
