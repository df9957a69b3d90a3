//! Progress UI (byte bar or spinner) for the active download.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use filesync_core::download::{
    ProgressEvent, ProgressSample, ProgressSink, RateEstimator, TracingProgress,
};
use filesync_core::format::{format_bytes, format_eta};
use indicatif::{ProgressBar, ProgressStyle};

/// Picks the terminal bar when requested, otherwise throttled log lines.
pub(crate) fn make_sink(use_bar: bool, interval: Duration) -> Box<dyn ProgressSink> {
    if use_bar {
        Box::new(BarProgress::new(interval))
    } else {
        Box::new(TracingProgress::new(interval))
    }
}

/// indicatif-backed sink; one bar per transfer attempt.
///
/// Position follows every chunk. The rate/ETA message is refreshed at most
/// once per interval from a sliding-window estimate.
pub(crate) struct BarProgress {
    interval: Duration,
    state: Mutex<BarState>,
}

struct BarState {
    bar: Option<ProgressBar>,
    estimator: RateEstimator,
    last_render: Option<Instant>,
}

impl BarProgress {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(BarState {
                bar: None,
                estimator: RateEstimator::new(interval, None),
                last_render: None,
            }),
        }
    }
}

fn bar_for(name: &str, offset: u64, total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{prefix} [{bar:30}] {bytes}/{total_bytes} {percent}% {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{prefix} {spinner} {bytes} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        }
    };
    bar.set_prefix(name.to_string());
    bar.set_position(offset);
    bar
}

fn render_message(estimator: &RateEstimator) -> String {
    let snapshot = estimator.snapshot();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rate = snapshot
        .rate
        .map_or_else(|| "-".to_string(), |r| format!("{}/s", format_bytes(r as u64)));
    format!("{rate} ETA {}", format_eta(snapshot.eta))
}

impl ProgressSink for BarProgress {
    fn on_event(&self, event: &ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event {
            ProgressEvent::Started {
                name,
                offset,
                total,
            } => {
                if let Some(previous) = state.bar.take() {
                    previous.finish_and_clear();
                }
                state.estimator.reset(*total);
                state.estimator.record(ProgressSample::now(*offset));
                let bar = bar_for(name, *offset, *total);
                bar.set_message(render_message(&state.estimator));
                state.bar = Some(bar);
                state.last_render = Some(Instant::now());
            }
            ProgressEvent::Sample(sample) => {
                state.estimator.record(*sample);
                let due = state
                    .last_render
                    .is_none_or(|last| sample.timestamp.duration_since(last) >= self.interval);
                let message = due.then(|| render_message(&state.estimator));
                if due {
                    state.last_render = Some(sample.timestamp);
                }
                if let Some(bar) = &state.bar {
                    bar.set_position(sample.bytes_transferred);
                    if let Some(message) = message {
                        bar.set_message(message);
                    }
                }
            }
            ProgressEvent::Finished { .. } => {
                if let Some(bar) = state.bar.take() {
                    bar.finish_and_clear();
                }
                state.last_render = None;
            }
        }
    }
}
