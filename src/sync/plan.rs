//! Planning: which listed files this run will download.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use super::SyncError;
use crate::download::RemoteFile;
use crate::filter::{FileFilter, matches_extension};
use crate::listing::is_plain_file_name;

/// A file selected for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFile {
    /// The remote file.
    pub remote: RemoteFile,
    /// Bytes of a partial copy already in the download directory.
    pub partial_bytes: u64,
}

impl PlannedFile {
    /// Percent of a partial download already on disk, when the size is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_complete(&self) -> Option<f64> {
        self.remote
            .size
            .filter(|size| *size > 0 && self.partial_bytes > 0)
            .map(|size| (self.partial_bytes as f64 / size as f64 * 100.0).min(100.0))
    }

    /// Bytes still to fetch, when the size is known.
    #[must_use]
    pub fn remaining_bytes(&self) -> Option<u64> {
        self.remote
            .size
            .map(|size| size.saturating_sub(self.partial_bytes))
    }
}

/// Result of filtering the remote listing against local state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    /// Files to download, in listing order.
    pub to_download: Vec<PlannedFile>,
    /// Names already present in the local directory.
    pub already_present: Vec<String>,
    /// Names rejected by the regex filter (all candidates when disabled).
    pub filtered_out: Vec<String>,
    /// Listed files dropped by the extension pre-filter.
    pub extension_excluded: usize,
    /// Whether the regex filter was enabled.
    pub filter_enabled: bool,
}

impl SyncPlan {
    /// Known bytes still to fetch across all planned files.
    #[must_use]
    pub fn remaining_bytes(&self) -> u64 {
        self.to_download
            .iter()
            .filter_map(PlannedFile::remaining_bytes)
            .sum()
    }

    /// Planned files whose size the listing did not give exactly.
    #[must_use]
    pub fn unknown_sizes(&self) -> usize {
        self.to_download
            .iter()
            .filter(|f| f.remote.size.is_none())
            .count()
    }

    /// Planned files with partial bytes on disk.
    pub fn resumable(&self) -> impl Iterator<Item = &PlannedFile> {
        self.to_download.iter().filter(|f| f.partial_bytes > 0)
    }

    /// Whether nothing is left to download.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty()
    }
}

/// Builds the plan from the listing.
///
/// Order of checks: extension, then regex filter, then presence in
/// `local_dir`, then partial bytes in `download_dir`.
///
/// # Errors
///
/// Returns [`SyncError::Directory`] when a local path cannot be inspected.
pub async fn build_plan(
    files: Vec<RemoteFile>,
    filter: &dyn FileFilter,
    extension: Option<&str>,
    local_dir: &Path,
    download_dir: &Path,
) -> Result<SyncPlan, SyncError> {
    let mut plan = SyncPlan {
        filter_enabled: filter.is_enabled(),
        ..SyncPlan::default()
    };

    for remote in files {
        if !is_plain_file_name(&remote.name) {
            warn!(file = %remote.name, "ignoring listed name that is not a plain file name");
            continue;
        }
        if !matches_extension(&remote.name, extension) {
            plan.extension_excluded += 1;
            continue;
        }
        if !filter.matches(&remote.name) {
            plan.filtered_out.push(remote.name);
            continue;
        }
        if is_file(&local_dir.join(&remote.name)).await? {
            debug!(file = %remote.name, "already present locally");
            plan.already_present.push(remote.name);
            continue;
        }
        let partial_bytes = file_len(&download_dir.join(&remote.name)).await?;
        plan.to_download.push(PlannedFile {
            remote,
            partial_bytes,
        });
    }

    Ok(plan)
}

async fn is_file(path: &Path) -> Result<bool, SyncError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::directory(path, e)),
    }
}

async fn file_len(path: &Path) -> Result<u64, SyncError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Ok(0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(SyncError::directory(path, e)),
    }
}
