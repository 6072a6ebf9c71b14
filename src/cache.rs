//! On-disk cache of raw feed responses.
//!
//! One flat file per target fingerprint, `<fingerprint>.cache`, holding the
//! fetched bytes verbatim. The file's modification time is the entry's
//! timestamp; there is no separate metadata file.
//!
//! # Known limitations
//!
//! - Fingerprints are 8 hex characters (32 bits of SHA-256), so two distinct
//!   targets can share an entry. The width is kept for compatibility with
//!   existing cache directories.
//! - There is no locking. Concurrent [`FileCache::put`] calls for the same key
//!   race and the last rename wins.
//! - Expired entries are removed lazily on the next [`FileCache::get`]; nothing
//!   sweeps the directory in the background.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// File extension for cache entries.
pub const CACHE_SUFFIX: &str = "cache";
/// Number of hex characters kept from the target hash.
pub const FINGERPRINT_LEN: usize = 8;

/// Errors raised by the cache store.
///
/// Both variants are non-fatal to a feed session: read failures are treated
/// as misses and write failures are logged.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to read cache entry {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write cache entry {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Derives the cache key for a request target.
///
/// # Examples
///
/// ```
/// let key = feedr::cache::fingerprint("https://example.com/rss");
/// assert_eq!(key.len(), 8);
/// assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
pub fn fingerprint(target: &str) -> String {
    let hash = Sha256::digest(target.as_bytes());
    let mut hex = format!("{:x}", hash);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Flat-directory cache keyed by [`fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCache {
    dir: PathBuf,
}

impl Default for FileCache {
    /// Caches into the process temporary directory.
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl FileCache {
    /// Creates a cache rooted at `dir`.
    ///
    /// The directory is not created; writes into a missing directory fail
    /// with [`CacheError::Write`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry file for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{CACHE_SUFFIX}"))
    }

    /// Returns the cached bytes for `key` if the entry is no older than `ttl`.
    ///
    /// - Missing entry → `Ok(None)`
    /// - Entry older than `ttl` → deleted, `Ok(None)`
    /// - Otherwise → the stored bytes, verbatim
    ///
    /// An mtime in the future counts as age zero.
    pub fn get(&self, key: &str, ttl: Duration) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(key);
        let read_err = |source| CacheError::Read {
            path: path.clone(),
            source,
        };

        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key = %key, "Cache miss");
                return Ok(None);
            }
            Err(e) => return Err(read_err(e)),
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        if age > ttl {
            tracing::debug!(
                key = %key,
                age_secs = age.as_secs(),
                ttl_secs = ttl.as_secs(),
                "Cache entry expired, evicting"
            );
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                // Another reader evicted it first
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to evict expired cache entry");
                }
            }
            return Ok(None);
        }

        match std::fs::read(&path) {
            Ok(bytes) => {
                tracing::debug!(key = %key, bytes = bytes.len(), "Cache hit");
                Ok(Some(bytes))
            }
            // Race condition: entry evicted between metadata and read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(read_err(e)),
        }
    }

    /// Stores `bytes` under `key`, replacing any previous entry, and hands
    /// the same slice back for write-through use.
    ///
    /// The bytes go to a uniquely named temporary file in the cache
    /// directory first and are then renamed over the entry, so readers never
    /// see a partial file. The rename refreshes the entry's mtime.
    pub fn put<'a>(&self, key: &str, bytes: &'a [u8]) -> Result<&'a [u8], CacheError> {
        let path = self.entry_path(key);

        // SEC-009: Randomized temp filename so concurrent writers never share one
        let random_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = self.dir.join(format!(
            "{key}.{CACHE_SUFFIX}.tmp.{:016x}.{}",
            random_suffix,
            std::process::id()
        ));

        let write_err = |source| CacheError::Write {
            path: path.clone(),
            source,
        };

        let result = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .and_then(|mut file| file.write_all(bytes))
            .and_then(|()| std::fs::rename(&temp_path, &path));

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(write_err(e));
        }

        tracing::debug!(key = %key, bytes = bytes.len(), "Cache entry written");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backdate(path: &Path, by: Duration) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_fingerprint_shape() {
        let key = fingerprint("https://example.com/feed.xml");
        assert_eq!(key.len(), FINGERPRINT_LEN);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        assert_eq!(fingerprint("a"), fingerprint("a"));
        assert_ne!(fingerprint("https://a.example/rss"), fingerprint("https://b.example/rss"));
        // SHA-256("abc") = ba7816bf...
        assert_eq!(fingerprint("abc"), "ba7816bf");
    }

    #[test]
    fn test_entry_path_layout() {
        let cache = FileCache::new("/var/cache/feedr");
        assert_eq!(
            cache.entry_path("deadbeef"),
            PathBuf::from("/var/cache/feedr/deadbeef.cache")
        );
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let payload = b"<rss version=\"2.0\"><channel/></rss>";

        let stored = cache.put("abcd1234", payload).unwrap();
        assert_eq!(stored, payload);

        let read = cache.get("abcd1234", Duration::from_secs(60)).unwrap();
        assert_eq!(read.as_deref(), Some(&payload[..]));
    }

    #[test]
    fn test_get_missing_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        assert!(cache.get("00000000", Duration::from_secs(60)).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_entry_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        std::fs::create_dir(cache.entry_path("abcd1234")).unwrap();

        let err = cache.get("abcd1234", Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, CacheError::Read { .. }));
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        cache.put("abcd1234", b"stale").unwrap();
        backdate(&cache.entry_path("abcd1234"), Duration::from_secs(5));

        assert!(cache.get("abcd1234", Duration::ZERO).unwrap().is_none());
        assert!(!cache.entry_path("abcd1234").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_entry_within_ttl_survives() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        cache.put("abcd1234", b"fresh").unwrap();
        backdate(&cache.entry_path("abcd1234"), Duration::from_secs(30));

        let read = cache.get("abcd1234", Duration::from_secs(60)).unwrap();
        assert_eq!(read.as_deref(), Some(&b"fresh"[..]));
    }

    #[test]
    fn test_put_overwrites_and_refreshes_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        cache.put("abcd1234", b"old").unwrap();
        backdate(&cache.entry_path("abcd1234"), Duration::from_secs(120));

        cache.put("abcd1234", b"new").unwrap();

        let read = cache.get("abcd1234", Duration::from_secs(60)).unwrap();
        assert_eq!(read.as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn test_put_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        cache.put("abcd1234", b"one").unwrap();
        cache.put("abcd1234", b"two").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("abcd1234.cache")]);
    }

    #[test]
    fn test_put_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("not-created"));

        let err = cache.put("abcd1234", b"bytes").unwrap_err();
        assert!(matches!(err, CacheError::Write { .. }));
        assert!(!dir.path().join("not-created").exists());
    }
}
