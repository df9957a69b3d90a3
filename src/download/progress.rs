//! Progress events, sliding-window rate estimation, and progress sinks.
//!
//! The transfer loop emits [`ProgressEvent`]s to a [`ProgressSink`] after
//! every chunk. Sinks are synchronous callbacks and must return quickly;
//! rendering sinks throttle themselves with [`RateEstimator`] snapshots.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

use super::TransferState;
use crate::format::{format_bytes, format_eta};

/// A byte count observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Bytes of the file on disk (including any resumed offset).
    pub bytes_transferred: u64,
    /// When the sample was taken.
    pub timestamp: Instant,
}

impl ProgressSample {
    /// Sample taken now.
    #[must_use]
    pub fn now(bytes_transferred: u64) -> Self {
        Self {
            bytes_transferred,
            timestamp: Instant::now(),
        }
    }
}

/// Events emitted for the active transfer.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A transfer attempt started writing at `offset`.
    Started {
        /// Filename.
        name: String,
        /// Bytes already on disk.
        offset: u64,
        /// Expected total, when known.
        total: Option<u64>,
    },
    /// A chunk reached the disk.
    Sample(ProgressSample),
    /// The file reached a terminal state.
    Finished {
        /// Filename.
        name: String,
        /// Final state of the transfer.
        state: TransferState,
    },
}

/// Consumer of progress events.
pub trait ProgressSink: Send + Sync {
    /// Handles one event. Must not block.
    fn on_event(&self, event: &ProgressEvent);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Estimated time remaining.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    /// Time left at the current rate.
    Remaining(Duration),
    /// Size is known but no rate has been measured yet.
    Calculating,
    /// Expected size is unknown, so no ETA can be given.
    Indeterminate,
}

/// Derived view of a transfer's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Bytes on disk.
    pub bytes: u64,
    /// Expected total, when known.
    pub total: Option<u64>,
    /// Smoothed rate in bytes per second, once measurable.
    pub rate: Option<f64>,
    /// Estimated time remaining.
    pub eta: Eta,
}

impl ProgressSnapshot {
    /// Percent complete, when the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        self.total
            .filter(|total| *total > 0)
            .map(|total| (self.bytes as f64 / total as f64 * 100.0).min(100.0))
    }
}

/// Sliding-window transfer rate estimator.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    window: Duration,
    total: Option<u64>,
    samples: VecDeque<ProgressSample>,
}

impl RateEstimator {
    /// Creates an estimator averaging over `window`.
    #[must_use]
    pub fn new(window: Duration, total: Option<u64>) -> Self {
        Self {
            window,
            total,
            samples: VecDeque::new(),
        }
    }

    /// Clears history for a new transfer attempt.
    pub fn reset(&mut self, total: Option<u64>) {
        self.total = total;
        self.samples.clear();
    }

    /// Adds a sample and drops samples that fell out of the window.
    ///
    /// One sample at or before the window start is kept as the anchor for
    /// the rate computation.
    pub fn record(&mut self, sample: ProgressSample) {
        self.samples.push_back(sample);
        let Some(cutoff) = sample.timestamp.checked_sub(self.window) else {
            return;
        };
        while self.samples.len() > 2 && self.samples[1].timestamp <= cutoff {
            self.samples.pop_front();
        }
    }

    /// Current rate and ETA.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let bytes = self.samples.back().map_or(0, |s| s.bytes_transferred);
        let rate = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => {
                let elapsed = last.timestamp.saturating_duration_since(first.timestamp);
                let delta = last.bytes_transferred.saturating_sub(first.bytes_transferred);
                (!elapsed.is_zero()).then(|| delta as f64 / elapsed.as_secs_f64())
            }
            _ => None,
        };

        let eta = match self.total {
            None => Eta::Indeterminate,
            Some(total) if bytes >= total => Eta::Remaining(Duration::ZERO),
            Some(total) => match rate {
                Some(rate) if rate > 0.0 => {
                    let remaining = total.saturating_sub(bytes) as f64;
                    // Beyond `Duration::MAX` there is nothing meaningful to show.
                    Duration::try_from_secs_f64(remaining / rate)
                        .map_or(Eta::Calculating, Eta::Remaining)
                }
                _ => Eta::Calculating,
            },
        };

        ProgressSnapshot {
            bytes,
            total: self.total,
            rate,
            eta,
        }
    }
}

/// Sink that logs throttled progress lines through `tracing`.
///
/// Used when no interactive terminal is attached.
#[derive(Debug)]
pub struct TracingProgress {
    interval: Duration,
    state: Mutex<TracingProgressState>,
}

#[derive(Debug)]
struct TracingProgressState {
    name: String,
    estimator: RateEstimator,
    last_logged: Option<Instant>,
}

impl TracingProgress {
    /// Creates a sink logging at most once per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(TracingProgressState {
                name: String::new(),
                estimator: RateEstimator::new(interval, None),
                last_logged: None,
            }),
        }
    }
}

impl ProgressSink for TracingProgress {
    fn on_event(&self, event: &ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event {
            ProgressEvent::Started { name, offset, total } => {
                state.name.clone_from(name);
                state.estimator.reset(*total);
                state.estimator.record(ProgressSample::now(*offset));
                state.last_logged = Some(Instant::now());
            }
            ProgressEvent::Sample(sample) => {
                state.estimator.record(*sample);
                let due = state
                    .last_logged
                    .is_none_or(|last| sample.timestamp.duration_since(last) >= self.interval);
                if due {
                    state.last_logged = Some(sample.timestamp);
                    let snapshot = state.estimator.snapshot();
                    info!(
                        file = %state.name,
                        bytes = %format_bytes(snapshot.bytes),
                        total = %snapshot.total.map_or_else(|| "?".to_string(), format_bytes),
                        rate = %snapshot.rate.map_or_else(|| "-".to_string(), |r| format!("{}/s", format_bytes(r as u64))),
                        eta = %format_eta(snapshot.eta),
                        "download progress"
                    );
                }
            }
            ProgressEvent::Finished { .. } => {
                state.last_logged = None;
            }
        }
    }
}
