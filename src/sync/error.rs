//! Error types for a sync run.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::listing::ListingError;

/// Errors that abort a sync run before or between files.
///
/// Per-file download failures are never surfaced here; they are recorded in
/// the [`super::SyncSummary`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configuration record was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The remote listing could not be obtained.
    #[error(transparent)]
    Listing(#[from] ListingError),

    /// The HTTP client could not be constructed.
    #[error("failed to initialize HTTP client: {source}")]
    Client {
        /// Builder error.
        #[source]
        source: reqwest::Error,
    },

    /// A working directory could not be created or inspected.
    #[error("cannot prepare directory {path}: {source}")]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Creates a directory error.
    pub fn directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Directory {
            path: path.into(),
            source,
        }
    }

    /// Whether the run stopped because of a shutdown request.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Listing(ListingError::Interrupted))
    }
}
