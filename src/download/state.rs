//! Remote/local file descriptors and the per-file transfer state machine.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::DownloadError;

/// A file advertised by the remote listing.
///
/// Immutable once enumerated for a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFile {
    /// Filename, also used as the local filename.
    pub name: String,
    /// Absolute download URL.
    pub url: String,
    /// Exact size in bytes, when advertised.
    pub size: Option<u64>,
    /// Last-modified text as shown by the listing.
    pub last_modified: Option<String>,
}

impl RemoteFile {
    /// Creates a descriptor without a last-modified stamp.
    pub fn new(name: impl Into<String>, url: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            size,
            last_modified: None,
        }
    }

    /// Attaches a last-modified stamp.
    #[must_use]
    pub fn with_last_modified(mut self, last_modified: impl Into<String>) -> Self {
        self.last_modified = Some(last_modified.into());
        self
    }
}

/// Snapshot of a local download target.
///
/// The on-disk length is the resumption checkpoint; nothing else is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Target path.
    pub path: PathBuf,
    /// Bytes currently on disk.
    pub bytes_written: u64,
}

impl LocalFile {
    /// Reads the current length of `path`; a missing file counts as 0 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the metadata lookup fails for a reason
    /// other than the file not existing.
    pub async fn inspect(path: &Path) -> Result<Self, DownloadError> {
        let bytes_written = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(DownloadError::io(path, e)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            bytes_written,
        })
    }

    /// Whether any bytes exist locally.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.bytes_written > 0
    }
}

/// Lifecycle of one file transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransferState {
    /// No attempt has started.
    NotStarted,
    /// An attempt is streaming bytes.
    InProgress,
    /// Interrupted by the user at `offset`; resumable.
    Paused {
        /// Bytes on disk when interrupted.
        offset: u64,
    },
    /// All bytes are on disk.
    Completed,
    /// Gave up.
    Failed {
        /// Why the transfer failed.
        reason: String,
    },
}

impl TransferState {
    /// Whether the transfer has reached a state the engine will not leave
    /// during this run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Paused { .. } | Self::Completed | Self::Failed { .. }
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `InProgress → InProgress` models a retry re-entering the negotiator.
    /// `Paused → InProgress` only happens across runs.
    #[must_use]
    pub fn can_transition_to(&self, next: &TransferState) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted | Self::Paused { .. } | Self::InProgress, Self::InProgress)
                | (
                    Self::NotStarted | Self::InProgress,
                    Self::Completed | Self::Failed { .. } | Self::Paused { .. }
                )
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inspect_missing_file_is_zero_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let local = LocalFile::inspect(&dir.path().join("missing.laz"))
            .await
            .unwrap();
        assert_eq!(local.bytes_written, 0);
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_inspect_partial_file_reports_length() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("partial.laz");
        std::fs::write(&path, b"abcd").unwrap();

        let local = LocalFile::inspect(&path).await.unwrap();
        assert_eq!(local.bytes_written, 4);
        assert!(local.exists());
        assert_eq!(local.path, path);
    }

    #[test]
    fn test_transfer_state_transitions() {
        let paused = TransferState::Paused { offset: 3 };
        let failed = TransferState::Failed {
            reason: "x".to_string(),
        };

        assert!(TransferState::NotStarted.can_transition_to(&TransferState::InProgress));
        assert!(paused.can_transition_to(&TransferState::InProgress));
        assert!(TransferState::InProgress.can_transition_to(&TransferState::Completed));
        assert!(TransferState::InProgress.can_transition_to(&paused));
        assert!(TransferState::InProgress.can_transition_to(&failed));
        assert!(TransferState::InProgress.can_transition_to(&TransferState::InProgress));

        assert!(!TransferState::Completed.can_transition_to(&TransferState::InProgress));
        assert!(!failed.can_transition_to(&TransferState::InProgress));
        assert!(!paused.can_transition_to(&TransferState::Completed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransferState::NotStarted.is_terminal());
        assert!(!TransferState::InProgress.is_terminal());
        assert!(TransferState::Completed.is_terminal());
        assert!(TransferState::Paused { offset: 0 }.is_terminal());
    }
}
