use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::normalize::{normalize_item, normalize_node, normalize_value, FeedItem};
use super::parser::{parse, FeedDocument, InputEncoding, ParseError};
use crate::cache::{fingerprint, FileCache};
use crate::config::Config;
use crate::transport::{DefaultTransport, Transport, TransportError, TransportOptions};
use crate::util::{Target, TargetError};

/// Errors that abort session construction.
///
/// Cache failures never show up here: a failed cache read is treated as a
/// miss and a failed cache write is logged and ignored.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The target is neither a URL nor an existing file
    #[error("Invalid feed target '{target}': {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: TargetError,
    },
    /// The transport could not retrieve the feed bytes
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] TransportError),
    /// The bytes did not form a usable document
    #[error("Malformed feed: {0}")]
    Malformed(#[from] ParseError),
}

/// What to load: a target and an optional cache lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    target: String,
    ttl_secs: u64,
}

impl FeedRequest {
    /// A request with caching disabled.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ttl_secs: 0,
        }
    }

    /// Enables caching with the given lifetime. Zero disables it again.
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Cache lifetime, or `None` when caching is disabled.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

impl From<&str> for FeedRequest {
    fn from(target: &str) -> Self {
        Self::new(target)
    }
}

/// Summary of a loaded feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    /// Normalized request target
    pub source: String,
    /// Declared feed version, empty if absent
    pub version: String,
    /// Raw response length in bytes
    pub size: usize,
}

/// Scalar fields of `<channel>`, normalized. All empty without a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    #[serde(rename = "lastBuildDate")]
    pub last_build_date: String,
}

/// Pipeline stage, recorded in logs as a session is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validating,
    CacheHit,
    Fetching,
    Parsed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::CacheHit => "cache_hit",
            Stage::Fetching => "fetching",
            Stage::Parsed => "parsed",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Opens feed sessions with a shared transport, cache and encoding.
///
/// Cloning is cheap; clones share the transport. Sessions opened from the
/// same client only share the cache directory.
#[derive(Clone)]
pub struct FeedClient {
    transport: Arc<dyn Transport + Send + Sync>,
    cache: FileCache,
    encoding: InputEncoding,
}

impl fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClient")
            .field("cache", &self.cache)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// A client with the default transport, the temp-dir cache and Latin-1
    /// input decoding.
    pub fn new() -> Result<Self, FeedError> {
        Self::from_config(&Config::default())
    }

    /// Builds a client from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, FeedError> {
        let transport = DefaultTransport::new(&TransportOptions {
            timeout: Duration::from_secs(config.timeout_secs),
            max_feed_size: config.max_feed_size,
            user_agent: config.user_agent.clone(),
        })?;

        Ok(Self {
            transport: Arc::new(transport),
            cache: FileCache::new(config.cache_dir()),
            encoding: config.encoding,
        })
    }

    /// A client over a caller-supplied transport.
    pub fn with_transport(transport: impl Transport + Send + Sync + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            cache: FileCache::default(),
            encoding: InputEncoding::default(),
        }
    }

    pub fn cache(mut self, cache: FileCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn encoding(mut self, encoding: InputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Validates, loads and parses a feed.
    ///
    /// With a TTL the cache is consulted first; a hit skips the transport
    /// but the cached bytes are still parsed. On a miss the fetched bytes
    /// are written back to the cache before parsing. Without a TTL the cache
    /// is never touched.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidTarget`] - not a URL and not an existing file
    /// - [`FeedError::Fetch`] - the transport failed; nothing is parsed
    /// - [`FeedError::Malformed`] - the bytes are not a usable document
    pub fn open(&self, request: FeedRequest) -> Result<FeedSession, FeedError> {
        tracing::debug!(feed = %request.target(), stage = %Stage::Validating, "Opening feed");

        let target = Target::parse(request.target()).map_err(|source| {
            tracing::debug!(feed = %request.target(), stage = %Stage::Failed, error = %source, "Invalid feed target");
            FeedError::InvalidTarget {
                target: request.target().to_string(),
                source,
            }
        })?;

        let (raw, from_cache) = match request.ttl() {
            Some(ttl) => self.load_cached(&request, &target, ttl)?,
            None => (self.fetch(&target)?, false),
        };

        let document = self.parse(&target, &raw)?;

        tracing::debug!(
            feed = %target,
            stage = %Stage::Parsed,
            from_cache = from_cache,
            items = document.items().count(),
            "Feed ready"
        );

        Ok(FeedSession {
            client: self.clone(),
            request,
            target,
            document,
            from_cache,
        })
    }

    fn load_cached(
        &self,
        request: &FeedRequest,
        target: &Target,
        ttl: Duration,
    ) -> Result<(Vec<u8>, bool), FeedError> {
        let key = fingerprint(request.target());

        match self.cache.get(&key, ttl) {
            Ok(Some(bytes)) => {
                tracing::debug!(feed = %target, key = %key, stage = %Stage::CacheHit, "Serving feed from cache");
                return Ok((bytes, true));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(feed = %target, key = %key, error = %e, "Cache read failed, treating as miss");
            }
        }

        let bytes = self.fetch(target)?;
        self.store(&key, &bytes);
        Ok((bytes, false))
    }

    fn fetch(&self, target: &Target) -> Result<Vec<u8>, FeedError> {
        tracing::debug!(feed = %target, stage = %Stage::Fetching, "Fetching feed");

        match self.transport.fetch(target) {
            Ok(bytes) => {
                tracing::info!(feed = %target, bytes = bytes.len(), "Fetched feed");
                Ok(bytes)
            }
            Err(e) => {
                tracing::debug!(feed = %target, stage = %Stage::Failed, error = %e, "Fetch failed");
                Err(FeedError::Fetch(e))
            }
        }
    }

    /// Writes through to the cache. Failures are logged, never returned.
    fn store(&self, key: &str, bytes: &[u8]) {
        if let Err(e) = self.cache.put(key, bytes) {
            tracing::warn!(key = %key, error = %e, "Failed to write feed cache entry");
        }
    }

    fn parse(&self, target: &Target, raw: &[u8]) -> Result<FeedDocument, FeedError> {
        parse(raw, self.encoding).map_err(|e| {
            tracing::debug!(
                feed = %target,
                stage = %Stage::Failed,
                diagnostics = e.diagnostics.len(),
                "Feed did not parse"
            );
            FeedError::Malformed(e)
        })
    }
}

/// A successfully loaded feed.
///
/// Only construction can fail. Every accessor returns an empty or default
/// value when the document lacks what it asks for.
#[derive(Debug, Clone)]
pub struct FeedSession {
    client: FeedClient,
    request: FeedRequest,
    target: Target,
    document: FeedDocument,
    from_cache: bool,
}

impl FeedSession {
    /// Opens a feed with a default [`FeedClient`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use feedr::{FeedRequest, FeedSession};
    ///
    /// let session = FeedSession::open(FeedRequest::new("https://example.com/rss").with_ttl(300))?;
    /// for item in session.items() {
    ///     println!("{} <{}>", item.title, item.link);
    /// }
    /// # Ok::<(), feedr::FeedError>(())
    /// ```
    pub fn open(request: FeedRequest) -> Result<Self, FeedError> {
        FeedClient::new()?.open(request)
    }

    /// The request target exactly as given.
    pub fn feed_url(&self) -> &str {
        self.request.target()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Declared feed version, or `""`.
    pub fn feed_version(&self) -> &str {
        self.document.version().unwrap_or_default()
    }

    /// Recomputed on every call.
    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            source: normalize_value(self.request.target()),
            version: self.document.version().map(normalize_value).unwrap_or_default(),
            size: self.size(),
        }
    }

    pub fn channel(&self) -> Channel {
        let Some(channel) = self.document.channel() else {
            return Channel::default();
        };
        let field = |name: &str| normalize_node(channel.child(name));

        Channel {
            title: field("title"),
            link: field("link"),
            description: field("description"),
            language: field("language"),
            pub_date: field("pubDate"),
            last_build_date: field("lastBuildDate"),
        }
    }

    /// One record per `<item>`, in document order.
    pub fn items(&self) -> Vec<FeedItem> {
        self.document.items().map(normalize_item).collect()
    }

    pub fn document(&self) -> &FeedDocument {
        &self.document
    }

    pub fn raw(&self) -> &[u8] {
        self.document.raw()
    }

    /// Raw response length in bytes.
    pub fn size(&self) -> usize {
        self.document.raw().len()
    }

    /// True when the current document came from the cache.
    pub fn is_cached(&self) -> bool {
        self.from_cache
    }

    /// Fetches the feed again, bypassing any cached copy.
    ///
    /// On success the document is replaced wholesale and, if the request
    /// has a TTL, the cache entry is rewritten. On failure the session keeps
    /// its previous document.
    pub fn refresh(&mut self) -> Result<(), FeedError> {
        let raw = self.client.fetch(&self.target)?;
        if self.request.ttl().is_some() {
            self.client.store(&fingerprint(self.request.target()), &raw);
        }

        self.document = self.client.parse(&self.target, &raw)?;
        self.from_cache = false;
        Ok(())
    }
}
