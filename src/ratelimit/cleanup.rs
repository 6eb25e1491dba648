//! Background sweep that keeps the sliding window store bounded.
//!
//! Keys belonging to clients that never come back would otherwise stay in
//! memory forever. The sweep runs every `2 * window_secs` and sleeps again
//! only after the previous sweep finished, so sweeps never overlap.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::window::SlidingWindowStore;
use crate::clock::Clock;

/// Periodic pruning task for a [`SlidingWindowStore`].
pub struct CleanupScheduler {
    store: Arc<SlidingWindowStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupScheduler {
    /// Create a stopped scheduler for `store`.
    pub fn new(store: Arc<SlidingWindowStore>, clock: Arc<dyn Clock>) -> Self {
        let interval = Duration::from_secs(store.config().window_secs().saturating_mul(2));
        Self {
            store,
            clock,
            interval,
            task: Mutex::new(None),
        }
    }

    /// Time between the end of one sweep and the start of the next.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the sweep task on the current tokio runtime.
    ///
    /// Calling this while the task is already running does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Cleanup scheduler already running");
            return;
        }

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let interval = self.interval;

        info!(interval_secs = interval.as_secs(), "Starting cleanup scheduler");
        *task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                sweep(&store, clock.as_ref());
            }
        }));
    }

    /// Cancel the pending sweep.
    ///
    /// The sweep itself never yields, so aborting can only land while the task
    /// is waiting for its next turn. Safe to call any number of times.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!("Cleanup scheduler stopped");
        }
    }

    /// Whether a sweep is currently scheduled.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sweep(store: &SlidingWindowStore, clock: &dyn Clock) {
    let removed = store.prune(clock.now_secs());
    debug!(
        removed = removed,
        remaining = store.len(),
        "Rate limiter cleanup sweep completed"
    );
}
