//! Sync orchestration: list, filter, download sequentially, summarize.
//!
//! # Example
//!
//! ```no_run
//! use filesync_core::download::NoopProgress;
//! use filesync_core::{CancellationCoordinator, SyncConfig, SyncOrchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = SyncConfig::default();
//! config.base_url = "https://example.com/lidar/".to_string();
//! config.username = "user".to_string();
//! config.password = "secret".to_string();
//! config.filter.enabled = true;
//!
//! let cancel = CancellationCoordinator::new();
//! let _listener = cancel.listen_for_signals();
//! let orchestrator = SyncOrchestrator::from_config(&config, cancel)?;
//! let summary = orchestrator.run(&NoopProgress).await?;
//! println!("completed {} / failed {}", summary.completed(), summary.failed());
//! # Ok(())
//! # }
//! ```

mod error;
mod plan;
mod summary;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::cancel::CancellationCoordinator;
use crate::config::SyncConfig;
use crate::download::{
    FileDownloader, FileOutcome, FileReport, HttpClient, ProgressSink, RetryPolicy, SkipReason,
};
use crate::filter::{FileFilter, RegexFilter};
use crate::listing::{HttpDirectoryListing, RemoteListing};

pub use error::SyncError;
pub use plan::{PlannedFile, SyncPlan, build_plan};
pub use summary::SyncSummary;

/// Local directories used by a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDirs {
    /// Already synchronized files.
    pub local_dir: PathBuf,
    /// Partial and new downloads.
    pub download_dir: PathBuf,
    /// Move completed files into `local_dir`.
    pub move_completed: bool,
}

/// Plans and runs one synchronization pass.
///
/// Files are downloaded strictly one after another. A shutdown request stops
/// the pass before the next file starts; the in-flight file is paused by the
/// engine at its next chunk boundary.
pub struct SyncOrchestrator {
    listing: Arc<dyn RemoteListing>,
    filter: Arc<dyn FileFilter>,
    extension: Option<String>,
    downloader: FileDownloader,
    dirs: SyncDirs,
    cancel: CancellationCoordinator,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("extension", &self.extension)
            .field("downloader", &self.downloader)
            .field("dirs", &self.dirs)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Assembles an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        listing: Arc<dyn RemoteListing>,
        filter: Arc<dyn FileFilter>,
        extension: Option<String>,
        downloader: FileDownloader,
        dirs: SyncDirs,
        cancel: CancellationCoordinator,
    ) -> Self {
        Self {
            listing,
            filter,
            extension,
            downloader,
            dirs,
            cancel,
        }
    }

    /// Builds the HTTP-backed orchestrator for a configuration record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the record does not validate and
    /// [`SyncError::Client`] if the HTTP client cannot be built.
    pub fn from_config(
        config: &SyncConfig,
        cancel: CancellationCoordinator,
    ) -> Result<Self, SyncError> {
        let base_url = config.validate()?;
        let filter = RegexFilter::from_config(&config.filter)?;
        info!(filter = %filter.describe(), "file filter configured");
        let client = HttpClient::with_timeouts(config.connect_timeout, config.read_timeout)
            .map_err(|source| SyncError::Client { source })?
            .with_basic_auth(&config.username, &config.password);
        let policy = RetryPolicy::new(config.max_retries, config.retry_delay);

        let listing =
            HttpDirectoryListing::new(client.clone(), base_url, policy.clone(), cancel.clone());
        let downloader =
            FileDownloader::new(Arc::new(client), policy, config.chunk_size, cancel.clone());

        Ok(Self::new(
            Arc::new(listing),
            Arc::new(filter),
            config.extension.clone(),
            downloader,
            SyncDirs {
                local_dir: config.local_dir.clone(),
                download_dir: config.download_dir.clone(),
                move_completed: config.move_completed,
            },
            cancel,
        ))
    }

    /// Lists the remote directory and decides what to download.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Listing`] when the listing cannot be fetched and
    /// [`SyncError::Directory`] when local state cannot be inspected.
    #[instrument(skip(self))]
    pub async fn plan(&self) -> Result<SyncPlan, SyncError> {
        let files = self.listing.list().await?;
        let plan = build_plan(
            files,
            self.filter.as_ref(),
            self.extension.as_deref(),
            &self.dirs.local_dir,
            &self.dirs.download_dir,
        )
        .await?;

        if !plan.filter_enabled {
            warn!(
                candidates = plan.filtered_out.len(),
                "filtering is disabled; no files will be downloaded"
            );
        }
        info!(
            to_download = plan.to_download.len(),
            already_present = plan.already_present.len(),
            filtered_out = plan.filtered_out.len(),
            extension_excluded = plan.extension_excluded,
            "sync plan ready"
        );
        Ok(plan)
    }

    /// Downloads every planned file in order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Directory`] if the working directories cannot be
    /// created. Per-file failures are reported in the summary instead.
    #[instrument(skip_all, fields(files = plan.to_download.len()))]
    pub async fn execute(
        &self,
        plan: SyncPlan,
        sink: &dyn ProgressSink,
    ) -> Result<SyncSummary, SyncError> {
        let started = Instant::now();
        let mut summary = SyncSummary {
            files: plan
                .already_present
                .iter()
                .map(|name| FileReport::skipped(name.clone(), SkipReason::AlreadyPresent))
                .collect(),
            filtered_out: plan.filtered_out,
            ..SyncSummary::default()
        };

        if !plan.to_download.is_empty() {
            ensure_dir(&self.dirs.download_dir).await?;
            if self.dirs.move_completed {
                ensure_dir(&self.dirs.local_dir).await?;
            }
        }

        let total = plan.to_download.len();
        let mut pending = plan.to_download.into_iter().enumerate();
        while let Some((index, planned)) = pending.next() {
            if self.cancel.is_cancelled() {
                summary.interrupted = true;
                summary.not_started.push(planned.remote.name);
                summary
                    .not_started
                    .extend(pending.by_ref().map(|(_, p)| p.remote.name));
                break;
            }

            info!(file = %planned.remote.name, index = index + 1, total, "downloading");
            let target = self.dirs.download_dir.join(&planned.remote.name);
            let mut report = self.downloader.download(&planned.remote, &target, sink).await;
            summary.bytes_transferred += report.bytes_received;

            if self.dirs.move_completed {
                self.move_to_local(&planned.remote.name, &target, &mut report.outcome)
                    .await;
            }

            let paused = matches!(report.outcome, FileOutcome::Paused { .. });
            summary.files.push(report);
            if paused {
                summary.interrupted = true;
                summary
                    .not_started
                    .extend(pending.by_ref().map(|(_, p)| p.remote.name));
                break;
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            completed = summary.completed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            paused = summary.paused(),
            bytes = summary.bytes_transferred,
            interrupted = summary.interrupted,
            "sync finished"
        );
        Ok(summary)
    }

    /// Moves a finished file from the download directory into `local_dir`.
    ///
    /// Covers files completed in this run and complete copies left behind by
    /// an earlier run. A failed move only warns; the file stays where it is.
    async fn move_to_local(&self, name: &str, target: &Path, outcome: &mut FileOutcome) {
        let source = match &*outcome {
            FileOutcome::Completed { path, .. } => path.clone(),
            FileOutcome::Skipped {
                reason: SkipReason::AlreadyDownloaded,
            } => target.to_path_buf(),
            _ => return,
        };
        let destination = self.dirs.local_dir.join(name);
        match move_file(&source, &destination).await {
            Ok(()) => {
                info!(file = %name, destination = %destination.display(), "moved to local directory");
                if let FileOutcome::Completed { path, .. } = outcome {
                    *path = destination;
                }
            }
            Err(e) => warn!(
                file = %name,
                error = %e,
                "could not move completed file; leaving it in the download directory"
            ),
        }
    }

    /// Plans and executes a full pass.
    ///
    /// # Errors
    ///
    /// See [`Self::plan`] and [`Self::execute`].
    pub async fn run(&self, sink: &dyn ProgressSink) -> Result<SyncSummary, SyncError> {
        let plan = self.plan().await?;
        self.execute(plan, sink).await
    }
}

async fn ensure_dir(path: &Path) -> Result<(), SyncError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| SyncError::directory(path, e))
}

async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems; fall back to copy + remove.
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}
