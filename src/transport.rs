//! Resolves a validated [`Target`] into raw feed bytes.
//!
//! The [`Transport`] trait is the seam between the session and the outside
//! world. [`DefaultTransport`] reads local files directly and fetches URLs
//! with a blocking `reqwest` client. A single attempt is made per call;
//! retry policy belongs to the caller.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::Target;

/// Default cap on the size of a feed body (10MB).
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024;
/// Default request timeout, matching reqwest's own blocking default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default `User-Agent` header for HTTP fetches.
pub const DEFAULT_USER_AGENT: &str = concat!("feedr/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while fetching feed bytes.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No usable connection: client construction, DNS, connect, TLS,
    /// timeout, unsupported scheme, or a body that broke off mid-read.
    #[error("Feed unreachable: {0}")]
    Unreachable(String),
    /// Local file could not be opened or read.
    #[error("Failed to read feed file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body exceeded the configured size limit
    #[error("Response too large (limit {0} bytes)")]
    TooLarge(usize),
}

/// Fetches raw bytes for a target.
///
/// Implementations must release every handle they open before returning,
/// on success and on error alike.
pub trait Transport {
    fn fetch(&self, target: &Target) -> Result<Vec<u8>, TransportError>;
}

/// Settings for [`DefaultTransport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub max_feed_size: usize,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Filesystem + HTTP(S) transport.
///
/// Redirects are followed using reqwest's default policy (up to 10 hops).
#[derive(Debug, Clone)]
pub struct DefaultTransport {
    client: reqwest::blocking::Client,
    max_feed_size: usize,
}

impl DefaultTransport {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unreachable`] if the runtime cannot provide
    /// an HTTP client (e.g. TLS backend initialization fails).
    pub fn new(options: &TransportOptions) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.as_str())
            .build()
            .map_err(|e| TransportError::Unreachable(format!("HTTP client unavailable: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: options.max_feed_size,
        })
    }

    fn fetch_url(&self, url: &url::Url) -> Result<Vec<u8>, TransportError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(TransportError::Unreachable(format!(
                    "unsupported scheme: {scheme}"
                )))
            }
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status().as_u16()));
        }

        // Fast path: check Content-Length header
        if let Some(len) = response.content_length() {
            if len > self.max_feed_size as u64 {
                return Err(TransportError::TooLarge(self.max_feed_size));
            }
        }

        read_limited(response, self.max_feed_size)
            .map_err(|e| TransportError::Unreachable(e.to_string()))?
    }

    fn fetch_path(&self, path: &std::path::Path) -> Result<Vec<u8>, TransportError> {
        let unreadable = |source| TransportError::Unreadable {
            path: path.to_path_buf(),
            source,
        };

        let file = std::fs::File::open(path).map_err(unreadable)?;
        read_limited(file, self.max_feed_size).map_err(unreadable)?
    }
}

impl Transport for DefaultTransport {
    fn fetch(&self, target: &Target) -> Result<Vec<u8>, TransportError> {
        let bytes = match target {
            Target::Url(url) => self.fetch_url(url)?,
            Target::Path(path) => self.fetch_path(path)?,
        };

        tracing::debug!(feed = %target, bytes = bytes.len(), "Fetched feed bytes");
        Ok(bytes)
    }
}

/// Reads `reader` to the end, failing once more than `limit` bytes arrive.
///
/// The outer `Result` carries I/O failures, the inner one the size check,
/// so callers can map I/O errors to their own variant.
fn read_limited<R: Read>(
    reader: R,
    limit: usize,
) -> std::io::Result<Result<Vec<u8>, TransportError>> {
    let mut bytes = Vec::new();
    reader
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut bytes)?;

    if bytes.len() > limit {
        return Ok(Err(TransportError::TooLarge(limit)));
    }
    Ok(Ok(bytes))
}
