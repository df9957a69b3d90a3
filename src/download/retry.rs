//! Retry classification and per-file retry budget.
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - may succeed on retry (timeouts, resets, 5xx)
//! - [`FailureType::Permanent`] - will not succeed on retry (404, local I/O)
//!
//! A [`RetryBudget`] then decides whether another attempt is allowed. Delays
//! are fixed rather than exponential; the caller waits them out through the
//! cancellation coordinator so a shutdown request cuts them short.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use filesync_core::download::{
//!     DownloadError, RetryDecision, RetryPolicy, classify_error,
//! };
//!
//! let mut budget = RetryPolicy::new(3, Duration::from_secs(5)).budget();
//! budget.start_attempt();
//! let error = DownloadError::http_status("https://example.com/tile.laz", 503);
//!
//! match budget.decide(classify_error(&error)) {
//!     RetryDecision::Retry { delay, next_attempt } => {
//!         println!("retrying in {delay:?} (attempt {next_attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: read timeout, connection reset, 503, body ended early.
    Transient,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 403 Forbidden, disk full.
    Permanent,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number comes next (1-indexed).
        next_attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry settings shared by every file of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` counts the first attempt and is
    /// clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Returns the maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Creates a fresh budget for one logical file transfer.
    #[must_use]
    pub fn budget(&self) -> RetryBudget {
        RetryBudget {
            max_attempts: self.max_attempts,
            delay: self.delay,
            attempts_used: 0,
        }
    }
}

/// Attempt accounting for one file.
///
/// Invariant: `attempts_used <= max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
    delay: Duration,
    attempts_used: u32,
}

impl RetryBudget {
    /// Records the start of an attempt and returns its 1-indexed number.
    ///
    /// Returns `None` once the budget is exhausted.
    pub fn start_attempt(&mut self) -> Option<u32> {
        if self.attempts_used >= self.max_attempts {
            return None;
        }
        self.attempts_used += 1;
        Some(self.attempts_used)
    }

    /// Attempts started so far.
    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Retries consumed so far (attempts beyond the first).
    #[must_use]
    pub fn retries_used(&self) -> u32 {
        self.attempts_used.saturating_sub(1)
    }

    /// Whether no further attempt may start.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts_used >= self.max_attempts
    }

    /// Decides whether the attempt that just failed should be retried.
    #[instrument(skip(self), fields(attempts_used = self.attempts_used, max_attempts = self.max_attempts))]
    pub fn decide(&self, failure_type: FailureType) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if self.is_exhausted() {
            debug!("max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.delay,
            next_attempt: self.attempts_used + 1,
        }
    }
}

/// Classifies a download error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 408, 429, 5xx | Transient |
/// | Other HTTP 4xx (401, 403, 404, 416, ...) | Permanent |
/// | Timeout, Network | Transient |
/// | Network (TLS / certificate) | Permanent |
/// | Truncated body | Transient |
/// | Malformed range, first time | Transient |
/// | Malformed range after fallback | Permanent |
/// | IO, InvalidUrl, SizeOverflow | Permanent |
#[instrument]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. } | DownloadError::Truncated { .. } => FailureType::Transient,
        DownloadError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        DownloadError::MalformedRange { after_fallback, .. } => {
            if *after_fallback {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::SizeOverflow { .. } => FailureType::Permanent,
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient, // Request Timeout
        429 => FailureType::Transient, // Too Many Requests
        status if (500..600).contains(&status) => FailureType::Transient,
        status if (400..500).contains(&status) => FailureType::Permanent,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}
