//! Exit code logic for the sync process.
//!
//! Single responsibility: map a run summary to the process exit outcome.

use filesync_core::SyncSummary;

use crate::ProcessExit;

/// Determines the process exit outcome from completed and failed counts.
///
/// Paused and skipped files never count as failures, so an interrupted run
/// with no failures exits successfully.
pub(crate) fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

pub(crate) fn exit_for_summary(summary: &SyncSummary) -> ProcessExit {
    determine_exit_outcome(summary.completed(), summary.failed())
}

#[cfg(test)]
mod tests {
    use filesync_core::{FileOutcome, FileReport};

    use super::*;

    fn report(name: &str, outcome: FileOutcome) -> FileReport {
        FileReport {
            name: name.to_string(),
            outcome,
            attempts: 1,
            retries: 0,
            bytes_received: 0,
        }
    }

    #[test]
    fn test_exit_outcome_success_when_no_failures() {
        assert_eq!(determine_exit_outcome(3, 0), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_success_when_zero_completed_zero_failed() {
        assert_eq!(determine_exit_outcome(0, 0), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_partial_when_mixed() {
        assert_eq!(determine_exit_outcome(2, 1), ProcessExit::Partial);
    }

    #[test]
    fn test_exit_outcome_failure_when_all_failed() {
        assert_eq!(determine_exit_outcome(0, 2), ProcessExit::Failure);
    }

    #[test]
    fn test_interrupted_run_without_failures_succeeds() {
        let summary = SyncSummary {
            files: vec![report("a.laz", FileOutcome::Paused { offset: 10 })],
            not_started: vec!["b.laz".to_string()],
            interrupted: true,
            ..SyncSummary::default()
        };
        assert_eq!(exit_for_summary(&summary), ProcessExit::Success);
    }

    #[test]
    fn test_failed_file_among_completed_is_partial() {
        let summary = SyncSummary {
            files: vec![
                report(
                    "a.laz",
                    FileOutcome::Completed {
                        bytes: 1,
                        path: "a.laz".into(),
                    },
                ),
                report(
                    "b.laz",
                    FileOutcome::Failed {
                        reason: "HTTP 404".to_string(),
                        attempts: 1,
                    },
                ),
            ],
            ..SyncSummary::default()
        };
        assert_eq!(exit_for_summary(&summary), ProcessExit::Partial);
    }
}
