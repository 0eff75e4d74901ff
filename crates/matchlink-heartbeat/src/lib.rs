//! Cancellable keepalive task for Matchlink.
//!
//! A hosted session disappears from the directory unless the host pings
//! it regularly. [`spawn`] runs that ping on its own Tokio task:
//!
//! - the first beat goes out immediately, then one every `interval`
//! - a failed beat is logged at `warn` and the loop keeps going
//! - [`HeartbeatHandle::stop`] ends the loop and waits for it, so no beat
//!   is in flight once it returns
//!
//! Dropping the handle without calling `stop` also ends the loop, at the
//! task's next wake-up.
//!
//! ```ignore
//! let handle = matchlink_heartbeat::spawn("session-42", HeartbeatConfig::default(), move || {
//!     let directory = directory.clone();
//!     let id = id.clone();
//!     async move { directory.heartbeat(&id).await }
//! });
//! // ...
//! let stats = handle.stop().await;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Time between beats. Default: 15 seconds.
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

impl HeartbeatConfig {
    /// Shortest interval the loop will run at.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Raises the interval to [`Self::MIN_INTERVAL`] if it is shorter.
    ///
    /// Called automatically by [`spawn`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "heartbeat interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }

    /// `true` if beats arrive often enough to keep a session alive that
    /// expires after `expiry` without one.
    pub fn keeps_alive(&self, expiry: Duration) -> bool {
        self.interval < expiry
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters for a heartbeat loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatStats {
    /// Beats that succeeded.
    pub beats_sent: u64,
    /// Beats that returned an error.
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    beats_sent: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> HeartbeatStats {
        HeartbeatStats {
            beats_sent: self.beats_sent.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owner of a running heartbeat loop.
pub struct HeartbeatHandle {
    label: String,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl HeartbeatHandle {
    /// Counters so far. The loop may still be running.
    pub fn stats(&self) -> HeartbeatStats {
        self.counters.snapshot()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `true` once the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop and waits for it to exit. A beat already in flight
    /// completes first.
    pub async fn stop(mut self) -> HeartbeatStats {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(label = %self.label, error = %e, "heartbeat task ended abnormally");
        }
        let stats = self.counters.snapshot();
        debug!(
            label = %self.label,
            beats_sent = stats.beats_sent,
            failures = stats.failures,
            "heartbeat stopped"
        );
        stats
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Spawns a heartbeat loop calling `beat` on every tick.
///
/// Must be called from inside a Tokio runtime.
pub fn spawn<F, Fut, E>(
    label: impl Into<String>,
    config: HeartbeatConfig,
    mut beat: F,
) -> HeartbeatHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let label = label.into();
    let config = config.validated();
    let counters = Arc::new(Counters::default());
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = {
        let label = label.clone();
        let counters = Arc::clone(&counters);
        tokio::spawn(async move {
            // First tick of `interval` completes immediately.
            let mut ticker = time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    // Fires on stop() and on handle drop.
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match beat().await {
                            Ok(()) => {
                                let n = counters.beats_sent.fetch_add(1, Ordering::Relaxed) + 1;
                                trace!(%label, beat = n, "heartbeat sent");
                            }
                            Err(e) => {
                                counters.failures.fetch_add(1, Ordering::Relaxed);
                                warn!(%label, error = %e, "heartbeat failed");
                            }
                        }
                    }
                }
            }
        })
    };

    debug!(%label, interval_ms = config.interval.as_millis() as u64, "heartbeat started");

    HeartbeatHandle {
        label,
        stop_tx: Some(stop_tx),
        task,
        counters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval_is_fifteen_seconds() {
        assert_eq!(HeartbeatConfig::default().interval, Duration::from_secs(15));
    }

    #[test]
    fn test_validated_clamps_to_minimum() {
        let cfg = HeartbeatConfig::with_interval(Duration::from_millis(10)).validated();
        assert_eq!(cfg.interval, HeartbeatConfig::MIN_INTERVAL);
    }

    #[test]
    fn test_validated_keeps_valid_interval() {
        let cfg = HeartbeatConfig::with_interval(Duration::from_secs(5)).validated();
        assert_eq!(cfg.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_keeps_alive_requires_strictly_shorter_interval() {
        let cfg = HeartbeatConfig::default();
        assert!(cfg.keeps_alive(Duration::from_secs(30)));
        assert!(!cfg.keeps_alive(Duration::from_secs(15)));
    }
}
