//! Resumable download engine.
//!
//! Downloads one file at a time from a range-capable HTTP server, resuming
//! from the length of the partial file already on disk.
//!
//! # Features
//!
//! - Byte-range resumption (`Range: bytes=N-`) with fallback to a full
//!   rewrite when the server ignores the range
//! - Fixed-size chunked writes; a cancellation only ever leaves whole chunks
//! - Fixed-delay retries for transient failures, interruptible by Ctrl-C
//! - Progress events with sliding-window rate and ETA
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use filesync_core::download::{plan_resume, ResumePlan};
//!
//! // 4 KiB on disk of a 10 KiB file: resume from byte 4096.
//! assert_eq!(
//!     plan_resume(4096, Some(10_240)),
//!     ResumePlan::Resume { offset: 4096 }
//! );
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod negotiate;
mod progress;
mod retry;
mod state;
mod transfer;

pub use client::{ByteStream, ContentRange, FetchResponse, HttpClient, RangeFetch, parse_content_range};
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS,
    READ_TIMEOUT_SECS,
};
pub use engine::{FileDownloader, FileOutcome, FileReport, SkipReason};
pub use error::DownloadError;
pub use negotiate::{
    ResumeDecision, ResumePlan, WriteMode, WritePlan, discard_partial, interpret_response,
    negotiate_start, plan_resume,
};
pub use progress::{
    Eta, NoopProgress, ProgressEvent, ProgressSample, ProgressSink, ProgressSnapshot,
    RateEstimator, TracingProgress,
};
pub use retry::{FailureType, RetryBudget, RetryDecision, RetryPolicy, classify_error};
pub use state::{LocalFile, RemoteFile, TransferState};
pub use transfer::{Transfer, TransferOutcome, run_transfer};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
