use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a feed target.
#[derive(Error, Debug)]
pub enum TargetError {
    /// The target string was empty or only whitespace.
    #[error("Empty feed target")]
    Empty,
    /// A `file://` URL that does not map to a local path.
    #[error("Invalid file URL: {0}")]
    InvalidFileUrl(String),
    /// Neither a URL with a host nor an existing regular file.
    #[error("Not a URL and not an existing file: {0}")]
    NotFound(String),
}

/// A validated feed location.
///
/// Construction goes through [`Target::parse`], so a `Target` always names
/// either a syntactically valid absolute URL with a host or a regular file
/// that existed at validation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Remote document, fetched over HTTP(S).
    Url(Url),
    /// Local document, read from disk.
    Path(PathBuf),
}

impl Target {
    /// Validates a raw target string.
    ///
    /// - `http://host/...`, `https://host/...` and any other URL with a
    ///   non-empty host are accepted as [`Target::Url`]. Whether the scheme
    ///   is fetchable is decided later by the transport.
    /// - `file:///path` URLs resolve to [`Target::Path`] and must exist.
    /// - Anything else is treated as a filesystem path and must be an
    ///   existing regular file.
    ///
    /// # Examples
    ///
    /// ```
    /// use feedr::util::Target;
    ///
    /// assert!(matches!(Target::parse("https://example.com/rss"), Ok(Target::Url(_))));
    /// assert!(Target::parse("/definitely/not/here.xml").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TargetError::Empty);
        }

        if let Ok(url) = Url::parse(trimmed) {
            if url.scheme() == "file" {
                let path = url
                    .to_file_path()
                    .map_err(|_| TargetError::InvalidFileUrl(trimmed.to_owned()))?;
                return Self::existing_file(path, trimmed);
            }
            if url.host_str().is_some_and(|h| !h.is_empty()) {
                return Ok(Target::Url(url));
            }
            // Scheme-only parses like `C:\feeds\a.xml` fall through to the
            // filesystem check below.
        }

        Self::existing_file(PathBuf::from(trimmed), trimmed)
    }

    fn existing_file(path: PathBuf, raw: &str) -> Result<Self, TargetError> {
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Target::Path(path)),
            _ => Err(TargetError::NotFound(raw.to_owned())),
        }
    }

    /// Returns the URL for remote targets.
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            Target::Url(url) => Some(url),
            Target::Path(_) => None,
        }
    }

    /// Returns the path for local targets.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Target::Path(path) => Some(path),
            Target::Url(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Url(url) => f.write_str(url.as_str()),
            Target::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_urls_accepted() {
        let target = Target::parse("https://example.com/feed.xml").unwrap();
        assert_eq!(
            target.as_url().and_then(|u| u.host_str()),
            Some("example.com")
        );
        assert!(Target::parse("http://127.0.0.1:8080/rss").is_ok());
    }

    #[test]
    fn test_other_schemes_with_host_accepted() {
        // Syntactically valid; the transport rejects it at fetch time.
        assert!(matches!(
            Target::parse("ftp://example.com/feed.xml"),
            Ok(Target::Url(_))
        ));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(Target::parse("   "), Err(TargetError::Empty)));
    }

    #[test]
    fn test_missing_file_rejected() {
        let result = Target::parse("/tmp/feedr_test_no_such_feed.xml");
        assert!(matches!(result, Err(TargetError::NotFound(_))));
    }

    #[test]
    fn test_url_without_host_rejected() {
        assert!(Target::parse("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_existing_file_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, "<rss/>").unwrap();

        let target = Target::parse(path.to_str().unwrap()).unwrap();
        assert_eq!(target.as_path(), Some(path.as_path()));
    }

    #[test]
    fn test_file_url_resolves_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, "<rss/>").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let target = Target::parse(url.as_str()).unwrap();
        assert!(matches!(target, Target::Path(_)));
    }

    #[test]
    fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Target::parse(dir.path().to_str().unwrap()).is_err());
    }
}
