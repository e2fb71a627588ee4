//! Small helpers shared by the fetcher and the CLI.
//!
//! - **Text**: character-safe truncation for stored error messages
//! - **URL validation**: scheme and host checks for new subscriptions

mod text;
mod url_validator;

pub use text::truncate_chars;
pub use url_validator::{validate_feed_url, UrlValidationError};
