//! Error types for the download module.
//!
//! Variants carry the URL or path they relate to so that a failure recorded
//! in the sync summary is actionable on its own.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring a single file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused/reset, TLS).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request or read timed out.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error (create, open, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The server answered a range request with an unusable partial response.
    ///
    /// The partial file has already been discarded when this is returned, so
    /// the next attempt starts from offset 0.
    #[error("malformed range response for {url}: {detail}")]
    MalformedRange {
        /// The URL being resumed.
        url: String,
        /// What was wrong with the response.
        detail: String,
        /// True when the request was already a from-zero fallback.
        after_fallback: bool,
    },

    /// The body ended before the expected size was reached.
    #[error("transfer of {url} ended early: expected {expected_bytes} bytes, got {actual_bytes}")]
    Truncated {
        /// The URL being downloaded.
        url: String,
        /// Expected total size in bytes.
        expected_bytes: u64,
        /// Bytes on disk when the stream ended.
        actual_bytes: u64,
    },

    /// The server sent more bytes than the expected total size.
    #[error("size overflow for {path}: expected {expected_bytes} bytes, received more")]
    SizeOverflow {
        /// Download path that overflowed.
        path: PathBuf,
        /// Expected total size in bytes.
        expected_bytes: u64,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Maps a reqwest error into a timeout or network error.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a malformed range error.
    pub fn malformed_range(
        url: impl Into<String>,
        detail: impl Into<String>,
        after_fallback: bool,
    ) -> Self {
        Self::MalformedRange {
            url: url.into(),
            detail: detail.into(),
            after_fallback,
        }
    }

    /// Creates a truncated body error.
    pub fn truncated(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Truncated {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a size overflow error.
    pub fn size_overflow(path: impl Into<PathBuf>, expected_bytes: u64) -> Self {
        Self::SizeOverflow {
            path: path.into(),
            expected_bytes,
        }
    }
}
