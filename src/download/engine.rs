//! Per-file download engine with retry-as-resume.
//!
//! [`FileDownloader`] drives one file through the transfer state machine:
//! it inspects the partial file, negotiates the start offset, runs the
//! transfer loop, and on a transient failure waits out the retry delay and
//! starts over from whatever is on disk. Cancellation is never an error: it
//! ends the file as [`FileOutcome::Paused`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use filesync_core::CancellationCoordinator;
//! use filesync_core::download::{
//!     FileDownloader, HttpClient, NoopProgress, RemoteFile, RetryPolicy,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?.with_basic_auth("user", "secret");
//! let downloader = FileDownloader::new(
//!     Arc::new(client),
//!     RetryPolicy::new(3, Duration::from_secs(5)),
//!     8192,
//!     CancellationCoordinator::new(),
//! );
//! let remote = RemoteFile::new("tile.laz", "https://example.com/data/tile.laz", Some(1024));
//! let report = downloader
//!     .download(&remote, Path::new("new_downloads/tile.laz"), &NoopProgress)
//!     .await;
//! println!("{}: {:?}", report.name, report.outcome);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::client::RangeFetch;
use super::negotiate::{ResumePlan, discard_partial, interpret_response, negotiate_start};
use super::progress::{ProgressEvent, ProgressSink};
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::state::{LocalFile, RemoteFile, TransferState};
use super::transfer::{Transfer, TransferOutcome, run_transfer};
use super::DownloadError;
use crate::cancel::{CancellationCoordinator, SleepOutcome};

/// Why a file was not transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A file of that name is already in the local directory.
    AlreadyPresent,
    /// The download directory already holds the complete file.
    AlreadyDownloaded,
}

/// Final result for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// All bytes are on disk at `path`.
    Completed {
        /// Final file length.
        bytes: u64,
        /// Where the file ended up.
        path: PathBuf,
    },
    /// Nothing was transferred.
    Skipped {
        /// Why.
        reason: SkipReason,
    },
    /// Gave up after `attempts` attempts.
    Failed {
        /// Last error, rendered.
        reason: String,
        /// Attempts made.
        attempts: u32,
    },
    /// Interrupted by the user; resumable from `offset`.
    Paused {
        /// Bytes on disk.
        offset: u64,
    },
}

impl FileOutcome {
    /// Terminal transfer state matching this outcome.
    #[must_use]
    pub fn transfer_state(&self) -> TransferState {
        match self {
            Self::Completed { .. } | Self::Skipped { .. } => TransferState::Completed,
            Self::Failed { reason, .. } => TransferState::Failed {
                reason: reason.clone(),
            },
            Self::Paused { offset } => TransferState::Paused { offset: *offset },
        }
    }
}

/// Outcome of one file plus attempt accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Filename.
    pub name: String,
    /// What happened.
    pub outcome: FileOutcome,
    /// Attempts started (0 when skipped before any request).
    pub attempts: u32,
    /// Attempts beyond the first.
    pub retries: u32,
    /// Bytes written to disk during this run.
    pub bytes_received: u64,
}

impl FileReport {
    /// Report for a file that was never attempted.
    #[must_use]
    pub fn skipped(name: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            name: name.into(),
            outcome: FileOutcome::Skipped { reason },
            attempts: 0,
            retries: 0,
            bytes_received: 0,
        }
    }
}

enum AttemptResult {
    AlreadyComplete { size: u64 },
    Transferred(TransferOutcome),
    /// Cancelled while waiting for the server, before any byte was written.
    Cancelled,
}

/// Downloads single files with resumption and a bounded retry budget.
///
/// Cheap to share: the fetcher is behind an [`Arc`] and the cancellation
/// coordinator is a clone of the process-wide one.
#[derive(Clone)]
pub struct FileDownloader {
    fetch: Arc<dyn RangeFetch>,
    policy: RetryPolicy,
    chunk_size: usize,
    cancel: CancellationCoordinator,
}

impl std::fmt::Debug for FileDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDownloader")
            .field("policy", &self.policy)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl FileDownloader {
    /// Creates a downloader.
    #[must_use]
    pub fn new(
        fetch: Arc<dyn RangeFetch>,
        policy: RetryPolicy,
        chunk_size: usize,
        cancel: CancellationCoordinator,
    ) -> Self {
        Self {
            fetch,
            policy,
            chunk_size: chunk_size.max(1),
            cancel,
        }
    }

    /// Downloads `remote` into `target`, resuming from any partial bytes.
    ///
    /// Never returns an error: failures, skips and interruptions are all
    /// reported through [`FileReport::outcome`].
    #[instrument(skip(self, remote, sink), fields(file = %remote.name, target = %target.display()))]
    pub async fn download(
        &self,
        remote: &RemoteFile,
        target: &Path,
        sink: &dyn ProgressSink,
    ) -> FileReport {
        let mut budget = self.policy.budget();
        let mut state = TransferState::NotStarted;
        let mut bytes_received = 0u64;

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break FileOutcome::Paused {
                    offset: on_disk_len(target).await,
                };
            }
            let Some(attempt) = budget.start_attempt() else {
                // `decide` stops retrying before this is reached.
                break FileOutcome::Failed {
                    reason: "retry budget exhausted".to_string(),
                    attempts: budget.attempts_used(),
                };
            };
            advance(&mut state, TransferState::InProgress);
            debug!(attempt, max_attempts = self.policy.max_attempts(), "starting attempt");

            match self.attempt(remote, target, sink).await {
                Ok(AttemptResult::AlreadyComplete { size }) if attempt == 1 => {
                    info!(size, "already downloaded");
                    advance(&mut state, TransferState::Completed);
                    break FileOutcome::Skipped {
                        reason: SkipReason::AlreadyDownloaded,
                    };
                }
                Ok(AttemptResult::AlreadyComplete { size }) => {
                    advance(&mut state, TransferState::Completed);
                    break FileOutcome::Completed {
                        bytes: size,
                        path: target.to_path_buf(),
                    };
                }
                Ok(AttemptResult::Transferred(TransferOutcome::Completed { bytes, received })) => {
                    bytes_received += received;
                    info!(bytes, attempt, "download completed");
                    advance(&mut state, TransferState::Completed);
                    break FileOutcome::Completed {
                        bytes,
                        path: target.to_path_buf(),
                    };
                }
                Ok(AttemptResult::Cancelled) => {
                    let offset = on_disk_len(target).await;
                    info!(offset, "cancelled while waiting for the server");
                    advance(&mut state, TransferState::Paused { offset });
                    break FileOutcome::Paused { offset };
                }
                Ok(AttemptResult::Transferred(TransferOutcome::Interrupted { offset, received })) => {
                    bytes_received += received;
                    info!(offset, "download paused");
                    let paused = TransferState::Paused { offset };
                    advance(&mut state, paused);
                    break FileOutcome::Paused { offset };
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
                            "retrying download"
                        );
                        if self.cancel.sleep(delay).await == SleepOutcome::Interrupted {
                            let offset = on_disk_len(target).await;
                            advance(&mut state, TransferState::Paused { offset });
                            break FileOutcome::Paused { offset };
                        }
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        warn!(error = %e, %reason, "download failed");
                        let reason = e.to_string();
                        advance(
                            &mut state,
                            TransferState::Failed {
                                reason: reason.clone(),
                            },
                        );
                        break FileOutcome::Failed {
                            reason,
                            attempts: budget.attempts_used(),
                        };
                    }
                },
            }
        };

        sink.on_event(&ProgressEvent::Finished {
            name: remote.name.clone(),
            state: outcome.transfer_state(),
        });

        FileReport {
            name: remote.name.clone(),
            outcome,
            attempts: budget.attempts_used(),
            retries: budget.retries_used(),
            bytes_received,
        }
    }

    async fn attempt(
        &self,
        remote: &RemoteFile,
        target: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<AttemptResult, DownloadError> {
        let local = LocalFile::inspect(target).await?;
        let decision = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(AttemptResult::Cancelled),
            decision = negotiate_start(self.fetch.as_ref(), remote, &local) => decision,
        };
        if let ResumePlan::AlreadyComplete { size } = decision.plan {
            return Ok(AttemptResult::AlreadyComplete { size });
        }
        let offset = decision.plan.start_offset();

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(AttemptResult::Cancelled),
            opened = self.fetch.open(&remote.url, offset) => opened,
        };
        let response = match opened {
            Err(DownloadError::HttpStatus { status: 416, .. }) if offset > 0 => {
                discard_partial(target).await?;
                return Err(DownloadError::malformed_range(
                    &remote.url,
                    format!("server rejected range starting at {offset}"),
                    false,
                ));
            }
            other => other?,
        };

        let plan = match interpret_response(&remote.url, offset, &response, decision.expected_size)
        {
            Ok(plan) => plan,
            Err(e) => {
                if offset > 0 {
                    discard_partial(target).await?;
                }
                return Err(e);
            }
        };

        let transfer = Transfer {
            name: &remote.name,
            url: &remote.url,
            path: target,
            plan,
            chunk_size: self.chunk_size,
        };
        run_transfer(&transfer, response.body, &self.cancel, sink)
            .await
            .map(AttemptResult::Transferred)
    }
}

fn advance(state: &mut TransferState, next: TransferState) {
    debug_assert!(
        state.can_transition_to(&next),
        "illegal transition {state:?} -> {next:?}"
    );
    debug!(from = ?state, to = ?next, "transfer state");
    *state = next;
}

async fn on_disk_len(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map_or(0, |m| m.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;

    use super::*;
    use crate::download::{ContentRange, FetchResponse, NoopProgress};

    type Reply = Result<FetchResponse, DownloadError>;

    /// Replays canned replies and records requested offsets.
    struct Scripted {
        replies: Mutex<VecDeque<Reply>>,
        offsets: Mutex<Vec<u64>>,
    }

    impl Scripted {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                offsets: Mutex::new(Vec::new()),
            })
        }

        fn offsets(&self) -> Vec<u64> {
            self.offsets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RangeFetch for Scripted {
        async fn open(&self, url: &str, start_offset: u64) -> Reply {
            self.offsets.lock().unwrap().push(start_offset);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DownloadError::http_status(url, 500)))
        }

        async fn probe_size(&self, _url: &str) -> Option<u64> {
            None
        }
    }

    fn ok(data: &'static [u8]) -> Reply {
        Ok(FetchResponse {
            status: 200,
            content_length: Some(data.len() as u64),
            content_range: None,
            body: Box::pin(stream::iter(vec![Ok::<_, DownloadError>(
                Bytes::from_static(data),
            )])),
        })
    }

    fn partial(data: &'static [u8], start: u64, total: u64) -> Reply {
        Ok(FetchResponse {
            status: 206,
            content_length: Some(data.len() as u64),
            content_range: Some(ContentRange {
                start,
                end: total - 1,
                total: Some(total),
            }),
            body: Box::pin(stream::iter(vec![Ok::<_, DownloadError>(
                Bytes::from_static(data),
            )])),
        })
    }

    fn downloader(fetch: Arc<Scripted>, cancel: CancellationCoordinator) -> FileDownloader {
        FileDownloader::new(fetch, RetryPolicy::new(3, Duration::ZERO), 4, cancel)
    }

    #[tokio::test]
    async fn test_fresh_download_completes() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("a.laz");
        let fetch = Scripted::new(vec![ok(b"abcdef")]);
        let remote = RemoteFile::new("a.laz", "http://h/a.laz", Some(6));

        let report = downloader(fetch.clone(), CancellationCoordinator::new())
            .download(&remote, &target, &NoopProgress)
            .await;

        assert!(matches!(report.outcome, FileOutcome::Completed { bytes: 6, .. }));
        assert_eq!(report.attempts, 1);
        assert_eq!(report.retries, 0);
        assert_eq!(report.bytes_received, 6);
        assert_eq!(std::fs::read(&target).unwrap(), b"abcdef");
        assert_eq!(fetch.offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_partial_file_resumes_with_range() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("a.laz");
        std::fs::write(&target, b"abc").unwrap();
        let fetch = Scripted::new(vec![partial(b"def", 3, 6)]);
        let remote = RemoteFile::new("a.laz", "http://h/a.laz", Some(6));

        let report = downloader(fetch.clone(), CancellationCoordinator::new())
            .download(&remote, &target, &NoopProgress)
            .await;

        assert!(matches!(report.outcome, FileOutcome::Completed { bytes: 6, .. }));
        assert_eq!(report.bytes_received, 3);
        assert_eq!(std::fs::read(&target).unwrap(), b"abcdef");
        assert_eq!(fetch.offsets(), vec![3]);
    }

    #[tokio::test]
    async fn test_complete_file_is_skipped_without_request() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("a.laz");
        std::fs::write(&target, b"abcdef").unwrap();
        let fetch = Scripted::new(vec![]);
        let remote = RemoteFile::new("a.laz", "http://h/a.laz", Some(6));

        let report = downloader(fetch.clone(), CancellationCoordinator::new())
            .download(&remote, &target, &NoopProgress)
            .await;

        assert_eq!(
            report.outcome,
            FileOutcome::Skipped {
                reason: SkipReason::AlreadyDownloaded
            }
        );
        assert!(fetch.offsets().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("a.laz");
        let fetch = Scripted::new(vec![Err(DownloadError::http_status("http://h/a.laz", 404))]);
        let remote = RemoteFile::new("a.laz", "http://h/a.laz", Some(6));

        let report = downloader(fetch.clone(), CancellationCoordinator::new())
            .download(&remote, &target, &NoopProgress)
            .await;

        assert!(matches!(report.outcome, FileOutcome::Failed { attempts: 1, .. }));
        assert_eq!(report.retries, 0);
        assert_eq!(fetch.offsets().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_budget() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("a.laz");
        let fetch = Scripted::new(vec![]);
        let remote = RemoteFile::new("a.laz", "http://h/a.laz", Some(6));

        let report = downloader(fetch.clone(), CancellationCoordinator::new())
            .download(&remote, &target, &NoopProgress)
            .await;

        match &report.outcome {
            FileOutcome::Failed { reason, attempts } => {
                assert_eq!(*attempts, 3);
                assert!(reason.contains("500"), "reason was {reason}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(report.retries, 2);
        assert_eq!(fetch.offsets().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_resumes_from_disk_length() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("a.laz");
        // First reply ends after 4 bytes of 8; the retry must ask for byte 4.
        let short = Ok(FetchResponse {
            status: 200,
            content_length: Some(8),
            content_range: None,
            body: Box::pin(stream::iter(vec![Ok::<_, DownloadError>(
                Bytes::from_static(b"abcd"),
            )])),
        });
        let fetch = Scripted::new(vec![short, partial(b"efgh", 4, 8)]);
        let remote = RemoteFile::new("a.laz", "http://h/a.laz", Some(8));

        let report = downloader(fetch.clone(), CancellationCoordinator::new())
            .download(&remote, &target, &NoopProgress)
            .await;

        assert!(matches!(report.outcome, FileOutcome::Completed { bytes: 8, .. }));
        assert_eq!(report.retries, 1);
        assert_eq!(fetch.offsets(), vec![0, 4]);
        assert_eq!(std::fs::read(&target).unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn test_mismatched_range_discards_partial_then_restarts() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("a.laz");
        std::fs::write(&target, b"abc").unwrap();
        let fetch = Scripted::new(vec![partial(b"abcdef", 0, 6), ok(b"abcdef")]);
        let remote = RemoteFile::new("a.laz", "http://h/a.laz", Some(6));

        let report = downloader(fetch.clone(), CancellationCoordinator::new())
            .download(&remote, &target, &NoopProgress)
            .await;

        assert!(matches!(report.outcome, FileOutcome::Completed { bytes: 6, .. }));
        assert_eq!(fetch.offsets(), vec![3, 0]);
        assert_eq!(std::fs::read(&target).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_paused() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("a.laz");
        std::fs::write(&target, b"ab").unwrap();
        let cancel = CancellationCoordinator::new();
        cancel.request();
        let fetch = Scripted::new(vec![]);
        let remote = RemoteFile::new("a.laz", "http://h/a.laz", Some(6));

        let report = downloader(fetch.clone(), cancel)
            .download(&remote, &target, &NoopProgress)
            .await;

        assert_eq!(report.outcome, FileOutcome::Paused { offset: 2 });
        assert_eq!(report.attempts, 0);
        assert!(fetch.offsets().is_empty());
    }

    #[test]
    fn test_report_serializes_with_tagged_outcome() {
        let report = FileReport::skipped("a.laz", SkipReason::AlreadyPresent);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["name"], "a.laz");
        assert_eq!(json["outcome"]["status"], "skipped");
        assert_eq!(json["outcome"]["reason"], "already_present");
    }
}
