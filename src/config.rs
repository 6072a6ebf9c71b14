//! Configuration file parser for ~/.config/feedr/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as a warning, since they are
//! usually typos.
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::InputEncoding;
use crate::transport::{DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding cache entries. `None` = the system temp directory.
    /// The directory must already exist.
    pub cache_dir: Option<PathBuf>,

    /// Default cache TTL in seconds. 0 = caching disabled.
    pub ttl_secs: u64,

    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum accepted feed body in bytes.
    pub max_feed_size: usize,

    /// How feed bytes are decoded before parsing: "latin1" or "utf8".
    pub encoding: InputEncoding,

    /// `User-Agent` sent with HTTP requests.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            ttl_secs: 0,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
            encoding: InputEncoding::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "cache_dir",
        "ttl_secs",
        "timeout_secs",
        "max_feed_size",
        "encoding",
        "user_agent",
    ];

    /// Effective cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = Self::read_source(path)? else {
            tracing::debug!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let table: toml::Table = content.parse()?;
        table
            .keys()
            .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
            .for_each(|key| tracing::warn!(key = %key, "Unknown key in config file, ignoring"));

        let config: Config = toml::Value::Table(table).try_into()?;
        tracing::info!(
            path = %path.display(),
            ttl_secs = config.ttl_secs,
            encoding = ?config.encoding,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Size-checked read of the config file; `None` when it does not exist.
    fn read_source(path: &Path) -> Result<Option<String>, ConfigError> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        // SEC-014: Check file size before reading
        let len = file.metadata()?.len();
        if len > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Config file is {} bytes (max {} bytes)",
                len,
                Self::MAX_FILE_SIZE
            )));
        }

        let mut content = String::with_capacity(len as usize);
        file.take(Self::MAX_FILE_SIZE).read_to_string(&mut content)?;
        Ok(Some(content))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache_dir, None);
        assert_eq!(config.cache_dir(), std::env::temp_dir());
        assert_eq!(config.ttl_secs, 0);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_feed_size, 10 * 1024 * 1024);
        assert_eq!(config.encoding, InputEncoding::Latin1);
        assert!(config.user_agent.starts_with("feedr/"));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let (_dir, path) = write_config("   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("ttl_secs = 300\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ttl_secs, 300);
        assert_eq!(config.timeout_secs, 30); // default
        assert_eq!(config.encoding, InputEncoding::Latin1); // default
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
cache_dir = "/var/cache/feedr"
ttl_secs = 900
timeout_secs = 5
max_feed_size = 2048
encoding = "utf8"
user_agent = "my-reader/1.0"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache_dir(), PathBuf::from("/var/cache/feedr"));
        assert_eq!(config.ttl_secs, 900);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_feed_size, 2048);
        assert_eq!(config.encoding, InputEncoding::Utf8);
        assert_eq!(config.user_agent, "my-reader/1.0");
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let (_dir, path) = write_config("encoding = \"ebcdic\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (_dir, path) = write_config("ttl_secs = 10\ntotally_fake_key = \"x\"\n");
        assert_eq!(Config::load(&path).unwrap().ttl_secs, 10);
    }

    #[test]
    fn test_directory_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (_dir, path) = write_config("ttl_secs = \"ten\"\n");
        assert!(Config::load(&path).is_err());
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }
}
