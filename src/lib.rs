//! Infovore fetches many independently hosted RSS/Atom feeds into a local
//! store without hammering any single origin.
//!
//! - [`feed`] - parsing, per-origin limiting, batch fetching, polling
//! - [`storage`] - the [`storage::FeedStore`] trait and its SQLite backend
//! - [`config`] - optional TOML configuration
//! - [`util`] - small shared helpers

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
