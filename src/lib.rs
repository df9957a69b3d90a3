//! filesync core library
//!
//! Synchronizes a local directory against a remote HTTP directory listing:
//! only files matching a filter are downloaded, partial downloads resume
//! from their on-disk length, and a Ctrl-C leaves every file in a resumable
//! state.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Resolved, validated configuration record
//! - [`cancel`] - Process-wide cooperative cancellation
//! - [`download`] - Resumable single-file download engine
//! - [`listing`] - Remote directory enumeration
//! - [`filter`] - Filename filter predicates
//! - [`sync`] - Planning and sequential execution of a sync pass
//! - [`format`] - Human-readable sizes and durations

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod config;
pub mod download;
pub mod filter;
pub mod format;
pub mod listing;
pub mod sync;

// Re-export commonly used types
pub use cancel::{CancellationCoordinator, SleepOutcome};
pub use config::{ConfigError, FilterConfig, SyncConfig};
pub use download::{
    DownloadError, FileDownloader, FileOutcome, FileReport, HttpClient, ProgressSink,
    RangeFetch, RemoteFile, RetryPolicy, TransferState,
};
pub use filter::{FileFilter, RegexFilter};
pub use listing::{HttpDirectoryListing, ListingError, RemoteListing};
pub use sync::{SyncDirs, SyncError, SyncOrchestrator, SyncPlan, SyncSummary};
