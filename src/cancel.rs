//! Cooperative cancellation shared by the orchestrator, retry controller and
//! transfer loop.
//!
//! A [`CancellationCoordinator`] is created once per process and injected
//! into the components that need it. The signal listener spawned by
//! [`CancellationCoordinator::listen_for_signals`] is its only writer; the
//! download code only reads it, at chunk boundaries and around retry delays.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of an interruptible wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The full delay elapsed.
    Elapsed,
    /// Cancellation was requested before the delay elapsed.
    Interrupted,
}

/// Process-wide cancellation state.
///
/// Clones share the same underlying flag. The flag moves from clear to set
/// exactly once; later requests are no-ops.
#[derive(Debug, Clone, Default)]
pub struct CancellationCoordinator {
    token: CancellationToken,
}

impl CancellationCoordinator {
    /// Creates a coordinator in the clear state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cooperative shutdown.
    ///
    /// Returns `true` only for the call that performed the clear→set
    /// transition.
    pub fn request(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Returns whether shutdown was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Sleeps for `delay` unless cancellation arrives first.
    pub async fn sleep(&self, delay: Duration) -> SleepOutcome {
        if self.is_cancelled() {
            return SleepOutcome::Interrupted;
        }
        tokio::select! {
            () = self.token.cancelled() => SleepOutcome::Interrupted,
            () = tokio::time::sleep(delay) => SleepOutcome::Elapsed,
        }
    }

    /// Spawns the interrupt listener that sets this coordinator.
    ///
    /// Listens for Ctrl-C everywhere and SIGTERM on Unix. Repeated signals are
    /// reported but never escalate to a forced exit.
    pub fn listen_for_signals(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                if !wait_for_interrupt().await {
                    warn!("interrupt listener unavailable; cancellation disabled");
                    return;
                }
                if coordinator.request() {
                    warn!("Termination requested. Completing current chunk...");
                } else {
                    debug!("interrupt received while already cancelling; ignoring");
                }
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_interrupt() -> bool {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut terminate) = signal(SignalKind::terminate()) else {
        return tokio::signal::ctrl_c().await.is_ok();
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.is_ok(),
        received = terminate.recv() => received.is_some(),
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() -> bool {
    tokio::signal::ctrl_c().await.is_ok()
}
