//! Aggregated results of a sync run.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::download::{FileOutcome, FileReport};

/// What a sync run did, file by file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncSummary {
    /// One report per file that reached the engine or was skipped as present.
    pub files: Vec<FileReport>,
    /// Names excluded by the filter.
    pub filtered_out: Vec<String>,
    /// Planned files never started because of a shutdown request.
    pub not_started: Vec<String>,
    /// Bytes written to disk during this run.
    pub bytes_transferred: u64,
    /// Wall-clock duration of the run.
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Whether the run stopped early on a shutdown request.
    pub interrupted: bool,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl SyncSummary {
    /// Files fully downloaded in this run.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Completed { .. }))
    }

    /// Files skipped as already present or already downloaded.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    /// Files that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    /// Files paused by a shutdown request.
    #[must_use]
    pub fn paused(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Paused { .. }))
    }

    /// Total retries across all files.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.files.iter().map(|f| f.retries).sum()
    }

    /// `(name, reason)` for every failed file.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().filter_map(|f| match &f.outcome {
            FileOutcome::Failed { reason, .. } => Some((f.name.as_str(), reason.as_str())),
            _ => None,
        })
    }

    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| predicate(&f.outcome)).count()
    }
}
