//! Feed fetching: parsing, per-origin rate limiting, batch orchestration and
//! background polling.
//!
//! # Architecture
//!
//! - [`parser`] - Feed parsing using the `feed-rs` crate
//! - [`limiter`] - Per-origin concurrency cap and request spacing
//! - [`fetcher`] - Single-feed fetch and batch fan-out into a [`FeedStore`]
//! - [`poller`] - Timer loop that runs a batch every polling interval
//!
//! # Example
//!
//! ```ignore
//! use infovore::feed::{Fetcher, Poller, PollerSettings};
//!
//! let fetcher = Fetcher::new(db, &config)?;
//! let outcome = fetcher.refresh_all(&CancellationToken::new()).await?;
//!
//! let poller = Poller::start(fetcher, PollerSettings::from_config(&config));
//! poller.stop().await;
//! ```
//!
//! [`FeedStore`]: crate::storage::FeedStore

pub mod fetcher;
pub mod limiter;
pub mod parser;
pub mod poller;

pub use fetcher::{BatchOutcome, FetchError, FetchResult, Fetcher, MAX_ERROR_LEN};
pub use limiter::{origin_of, AcquireCancelled, OriginLimiter, OriginPermit};
pub use parser::{parse_feed, ParsedEntry, ParsedFeed};
pub use poller::{effective_interval, Poller, PollerSettings};
