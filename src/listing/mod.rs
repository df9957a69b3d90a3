//! Remote directory enumeration.
//!
//! The sync orchestrator only sees the [`RemoteListing`] trait.
//! [`HttpDirectoryListing`] implements it by fetching an Apache-style index
//! page with basic auth and parsing its file table, retrying transient
//! fetch failures with the same budget as file downloads.

mod error;
mod parse;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use url::Url;

use crate::cancel::{CancellationCoordinator, SleepOutcome};
use crate::download::{HttpClient, RemoteFile, RetryDecision, RetryPolicy, classify_error};

pub use error::ListingError;
pub use parse::{is_plain_file_name, parse_listing, parse_size};

/// Source of the remote file set.
#[async_trait]
pub trait RemoteListing: Send + Sync {
    /// Enumerates the remote files.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError`] when the listing cannot be obtained.
    async fn list(&self) -> Result<Vec<RemoteFile>, ListingError>;
}

/// Listing backed by an HTTP directory index page.
#[derive(Debug, Clone)]
pub struct HttpDirectoryListing {
    client: HttpClient,
    url: Url,
    policy: RetryPolicy,
    cancel: CancellationCoordinator,
}

impl HttpDirectoryListing {
    /// Creates a listing for the directory at `url`.
    ///
    /// `url` should end with `/` so that file links resolve inside it;
    /// [`crate::SyncConfig::validate`] guarantees that.
    #[must_use]
    pub fn new(
        client: HttpClient,
        url: Url,
        policy: RetryPolicy,
        cancel: CancellationCoordinator,
    ) -> Self {
        Self {
            client,
            url,
            policy,
            cancel,
        }
    }
}

#[async_trait]
impl RemoteListing for HttpDirectoryListing {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn list(&self) -> Result<Vec<RemoteFile>, ListingError> {
        let mut budget = self.policy.budget();

        loop {
            if self.cancel.is_cancelled() {
                return Err(ListingError::Interrupted);
            }
            budget.start_attempt();

            let fetched = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ListingError::Interrupted),
                fetched = self.client.fetch_text(self.url.as_str()) => fetched,
            };
            match fetched {
                Ok(html) => {
                    let files = parse_listing(&html, &self.url)
                        .ok_or_else(|| ListingError::no_table(self.url.as_str()))?;
                    info!(count = files.len(), "fetched remote listing");
                    return Ok(files);
                }
                Err(e) => match budget.decide(classify_error(&e)) {
                    RetryDecision::Retry {
                        delay,
                        next_attempt,
                    } => {
                        warn!(
                            attempt = next_attempt,
                            max_attempts = self.policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "retrying listing fetch"
                        );
                        if self.cancel.sleep(delay).await == SleepOutcome::Interrupted {
                            return Err(ListingError::Interrupted);
                        }
                    }
                    RetryDecision::DoNotRetry { .. } => {
                        return Err(ListingError::fetch(
                            self.url.as_str(),
                            budget.attempts_used(),
                            e,
                        ));
                    }
                },
            }
        }
    }
}
