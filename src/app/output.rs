//! CLI output formatting and display helpers.
//!
//! Line builders are pure so they can be tested; the `print_*` functions
//! write the lines to stdout.

use anyhow::{Context, Result};
use filesync_core::format::{format_bytes, format_duration};
use filesync_core::{FileOutcome, SyncPlan, SyncSummary};
use serde::Serialize;

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub(crate) fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending ellipsis if truncated.
pub(crate) fn truncate_to_width(text: &str, width: usize) -> String {
    let text_len = text.chars().count();
    if text_len <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    if width == 1 {
        return "…".to_string();
    }

    let mut output: String = text.chars().take(width - 1).collect();
    output.push('…');
    output
}

/// Pre-download overview: what will be fetched and what is resumable.
pub(crate) fn plan_lines(plan: &SyncPlan) -> Vec<String> {
    let mut lines = Vec::new();
    if !plan.filter_enabled {
        lines.push(format!(
            "Filtering is disabled: {} listed files will not be downloaded. Enable the filter to download.",
            plan.filtered_out.len()
        ));
        return lines;
    }

    let unknown = plan.unknown_sizes();
    let mut headline = format!(
        "{} files to download ({} known", plan.to_download.len(),
        format_bytes(plan.remaining_bytes())
    );
    if unknown > 0 {
        headline.push_str(&format!(", {unknown} of unknown size"));
    }
    headline.push(')');
    lines.push(headline);

    if !plan.already_present.is_empty() {
        lines.push(format!(
            "{} files already present locally",
            plan.already_present.len()
        ));
    }
    if !plan.filtered_out.is_empty() {
        lines.push(format!(
            "{} files excluded by the filter",
            plan.filtered_out.len()
        ));
    }
    if plan.extension_excluded > 0 {
        lines.push(format!(
            "{} files excluded by extension",
            plan.extension_excluded
        ));
    }

    let resumable: Vec<_> = plan.resumable().collect();
    if !resumable.is_empty() {
        lines.push(format!("{} partial downloads will resume:", resumable.len()));
        for file in resumable {
            let progress = file.percent_complete().map_or_else(
                || format!("{} on disk", format_bytes(file.partial_bytes)),
                |percent| format!("{percent:.1}% ({})", format_bytes(file.partial_bytes)),
            );
            lines.push(format!("  {}: {progress}", file.remote.name));
        }
    }
    lines
}

/// Lists every file the plan would download, for `--dry-run`.
pub(crate) fn dry_run_lines(plan: &SyncPlan) -> Vec<String> {
    let mut lines = plan_lines(plan);
    for file in &plan.to_download {
        let size = file
            .remote
            .size
            .map_or_else(|| "unknown size".to_string(), format_bytes);
        lines.push(format!("  would download {} ({size})", file.remote.name));
    }
    lines
}

/// End-of-run report.
pub(crate) fn summary_lines(summary: &SyncSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Completed: {}, Skipped: {}, Failed: {}, Paused: {} | {} in {} ({} retries)",
        summary.completed(),
        summary.skipped(),
        summary.failed(),
        summary.paused(),
        format_bytes(summary.bytes_transferred),
        format_duration(summary.elapsed),
        summary.retries(),
    )];

    for (name, reason) in summary.failures() {
        lines.push(format!("  failed {name}: {reason}"));
    }
    for report in &summary.files {
        if let FileOutcome::Paused { offset } = report.outcome {
            lines.push(format!(
                "  paused {} at {} (resumes on the next run)",
                report.name,
                format_bytes(offset)
            ));
        }
    }
    if summary.interrupted {
        lines.push(format!(
            "Interrupted: {} files not started",
            summary.not_started.len()
        ));
    }
    lines
}

fn print_lines(lines: Vec<String>) {
    let width = terminal_width();
    for line in lines {
        println!("{}", truncate_to_width(&line, width));
    }
}

pub(crate) fn print_plan(plan: &SyncPlan) {
    print_lines(plan_lines(plan));
}

pub(crate) fn print_dry_run(plan: &SyncPlan) {
    print_lines(dry_run_lines(plan));
}

pub(crate) fn print_summary(summary: &SyncSummary) {
    print_lines(summary_lines(summary));
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use filesync_core::download::{RemoteFile, SkipReason};
    use filesync_core::sync::PlannedFile;
    use filesync_core::{FileOutcome, FileReport};

    use super::*;

    fn planned(name: &str, size: Option<u64>, partial: u64) -> PlannedFile {
        PlannedFile {
            remote: RemoteFile::new(name, format!("http://h/{name}"), size),
            partial_bytes: partial,
        }
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("abc", 5), "abc");
        assert_eq!(truncate_to_width("abcdef", 4), "abc…");
        assert_eq!(truncate_to_width("abcdef", 1), "…");
        assert_eq!(truncate_to_width("abcdef", 0), "");
    }

    #[test]
    fn test_plan_lines_disabled_filter_warns() {
        let plan = SyncPlan {
            filtered_out: vec!["a".into(), "b".into()],
            filter_enabled: false,
            ..SyncPlan::default()
        };
        let lines = plan_lines(&plan);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Filtering is disabled: 2 listed files"));
    }

    #[test]
    fn test_plan_lines_report_partial_percentages() {
        let plan = SyncPlan {
            to_download: vec![
                planned("a.laz", Some(1000), 250),
                planned("b.laz", None, 0),
            ],
            already_present: vec!["c.laz".into()],
            filter_enabled: true,
            ..SyncPlan::default()
        };
        let lines = plan_lines(&plan);
        assert_eq!(lines[0], "2 files to download (750 B known, 1 of unknown size)");
        assert_eq!(lines[1], "1 files already present locally");
        assert_eq!(lines[2], "1 partial downloads will resume:");
        assert_eq!(lines[3], "  a.laz: 25.0% (250 B)");
    }

    #[test]
    fn test_dry_run_lists_each_file() {
        let plan = SyncPlan {
            to_download: vec![planned("a.laz", Some(2048), 0), planned("b.laz", None, 0)],
            filter_enabled: true,
            ..SyncPlan::default()
        };
        let lines = dry_run_lines(&plan);
        assert!(lines.contains(&"  would download a.laz (2.0 KB)".to_string()));
        assert!(lines.contains(&"  would download b.laz (unknown size)".to_string()));
    }

    #[test]
    fn test_summary_lines() {
        let summary = SyncSummary {
            files: vec![
                FileReport::skipped("a.laz", SkipReason::AlreadyPresent),
                FileReport {
                    name: "b.laz".into(),
                    outcome: FileOutcome::Failed {
                        reason: "HTTP 404".into(),
                        attempts: 1,
                    },
                    attempts: 1,
                    retries: 0,
                    bytes_received: 0,
                },
                FileReport {
                    name: "c.laz".into(),
                    outcome: FileOutcome::Paused { offset: 4096 },
                    attempts: 2,
                    retries: 1,
                    bytes_received: 4096,
                },
            ],
            not_started: vec!["d.laz".into()],
            bytes_transferred: 4096,
            elapsed: Duration::from_secs(65),
            interrupted: true,
            ..SyncSummary::default()
        };
        let lines = summary_lines(&summary);
        assert_eq!(
            lines[0],
            "Completed: 0, Skipped: 1, Failed: 1, Paused: 1 | 4.0 KB in 1m 5s (1 retries)"
        );
        assert_eq!(lines[1], "  failed b.laz: HTTP 404");
        assert_eq!(lines[2], "  paused c.laz at 4.0 KB (resumes on the next run)");
        assert_eq!(lines[3], "Interrupted: 1 files not started");
    }
}
