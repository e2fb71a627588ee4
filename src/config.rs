//! Configuration file parser for `infovore.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// Floor for the polling interval. Stored settings below it are raised.
    pub min_polling_interval_minutes: u32,

    /// Maximum concurrent requests to a single origin.
    pub per_origin_concurrency: usize,

    /// Minimum gap between two requests to the same origin.
    pub origin_spacing_ms: u64,

    /// Worker count when the storage backend tolerates concurrent writers.
    pub high_concurrency_workers: usize,

    /// Worker count otherwise. 1 means strictly sequential.
    pub low_concurrency_workers: usize,

    /// Deadline for one background polling batch.
    pub batch_timeout_secs: u64,

    /// Deadline for one feed request, body included.
    pub request_timeout_secs: u64,

    /// Largest accepted feed document.
    pub max_feed_bytes: usize,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("infovore.db"),
            min_polling_interval_minutes: 15,
            per_origin_concurrency: 2,
            origin_spacing_ms: 500,
            high_concurrency_workers: 10,
            low_concurrency_workers: 1,
            batch_timeout_secs: 600,
            request_timeout_secs: 30,
            max_feed_bytes: 10 * 1024 * 1024,
            user_agent: format!("infovore/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "database_path",
        "min_polling_interval_minutes",
        "per_origin_concurrency",
        "origin_spacing_ms",
        "high_concurrency_workers",
        "low_concurrency_workers",
        "batch_timeout_secs",
        "request_timeout_secs",
        "max_feed_bytes",
        "user_agent",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            database = %config.database_path.display(),
            per_origin = config.per_origin_concurrency,
            spacing_ms = config.origin_spacing_ms,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn origin_spacing(&self) -> Duration {
        Duration::from_millis(self.origin_spacing_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Worker count for a backend with the given capability flag.
    pub fn workers_for(&self, high_concurrency: bool) -> usize {
        if high_concurrency {
            self.high_concurrency_workers
        } else {
            self.low_concurrency_workers
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_temp(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("infovore.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, PathBuf::from("infovore.db"));
        assert_eq!(config.min_polling_interval_minutes, 15);
        assert_eq!(config.per_origin_concurrency, 2);
        assert_eq!(config.origin_spacing(), Duration::from_millis(500));
        assert_eq!(config.workers_for(true), 10);
        assert_eq!(config.workers_for(false), 1);
        assert_eq!(config.batch_timeout(), Duration::from_secs(600));
        assert!(config.user_agent.starts_with("infovore/"));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/infovore_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_returns_default() {
        assert_eq!(Config::from_toml("  \n \n").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_temp(
            "infovore_config_test_partial",
            "per_origin_concurrency = 4\norigin_spacing_ms = 1000\n",
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.per_origin_concurrency, 4);
        assert_eq!(config.origin_spacing(), Duration::from_secs(1));
        assert_eq!(config.min_polling_interval_minutes, 15);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::from_toml("per_origin_concurrency = \"two\"\n").is_err());
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml("totally_fake_key = 1\nuser_agent = \"bot\"\n").unwrap();
        assert_eq!(config.user_agent, "bot");
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_temp("infovore_config_test_too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
