//! Error types for the remote listing.

use thiserror::Error;

use crate::download::DownloadError;

/// Errors that abort enumeration of the remote directory.
///
/// Unlike per-file download failures, these end the run: without a listing
/// there is nothing to synchronize.
#[derive(Debug, Error)]
pub enum ListingError {
    /// The listing page could not be fetched.
    #[error("failed to fetch listing {url} after {attempts} attempt(s): {source}")]
    Fetch {
        /// Listing URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Last fetch error.
        #[source]
        source: DownloadError,
    },

    /// The page has no directory index table.
    #[error("no file table found in listing {url}")]
    NoTable {
        /// Listing URL.
        url: String,
    },

    /// Cancellation was requested while fetching the listing.
    #[error("listing interrupted by shutdown request")]
    Interrupted,
}

impl ListingError {
    /// Creates a fetch error.
    pub fn fetch(url: impl Into<String>, attempts: u32, source: DownloadError) -> Self {
        Self::Fetch {
            url: url.into(),
            attempts,
            source,
        }
    }

    /// Creates a missing-table error.
    pub fn no_table(url: impl Into<String>) -> Self {
        Self::NoTable { url: url.into() }
    }
}
