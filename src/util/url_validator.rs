use thiserror::Error;
use url::Url;

/// Errors returned when a subscription URL is rejected.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host to fetch from.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a feed subscription.
///
/// Only `http` and `https` URLs with a host are accepted; the host is what
/// the origin limiter keys on.
///
/// # Examples
///
/// ```
/// use infovore::util::validate_feed_url;
///
/// let url = validate_feed_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// assert!(validate_feed_url("not a url").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_and_https() {
        assert!(validate_feed_url("http://example.com/rss").is_ok());
        assert!(validate_feed_url("https://example.com:8443/atom.xml").is_ok());
    }

    #[test]
    fn test_rejects_other_schemes() {
        match validate_feed_url("ftp://example.com/feed") {
            Err(UrlValidationError::UnsupportedScheme(s)) => assert_eq!(s, "ftp"),
            other => panic!("Expected UnsupportedScheme, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            validate_feed_url("::::"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
