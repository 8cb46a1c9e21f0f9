//! Background sweep of idle rate limit entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::store::SlidingWindowStore;

/// Owns the periodic sweep task of a [`SlidingWindowStore`].
///
/// The task runs until [`shutdown`](SweepHandle::shutdown) is called, the
/// handle is dropped, or the store itself is dropped.
pub struct SweepHandle {
    cancel_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub(crate) fn spawn(store: Weak<SlidingWindowStore>, interval: Duration) -> Self {
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        // tokio panics on a zero period
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else {
                            break;
                        };
                        let removed = store.sweep();
                        if removed > 0 {
                            info!(removed, remaining = store.len(), "Swept idle rate limit entries");
                        }
                    }
                }
            }

            debug!("Rate limit sweeper stopped");
        });

        debug!(interval = ?period, "Rate limit sweeper started");
        Self { cancel_tx, task }
    }

    /// Whether the sweep task has already exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the sweep and wait for the task to exit.
    pub async fn shutdown(self) {
        // Err means the task already exited on its own.
        let _ = self.cancel_tx.send(());

        if let Err(e) = self.task.await {
            warn!(error = %e, "Rate limit sweeper task failed");
        }
    }
}

impl std::fmt::Debug for SweepHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepHandle")
            .field("cancel_tx", &"<channel>")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ratelimit::clock::ManualClock;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_idle_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(
            SlidingWindowStore::with_clock(clock.clone()).with_retention(Duration::from_secs(2)),
        );
        store.check_and_record("idle", 1_000, 5);

        let handle = store.start_sweeper(Duration::from_secs(60));

        clock.set(5_000);
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(store.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let store = Arc::new(SlidingWindowStore::new());
        let handle = store.start_sweeper(Duration::from_secs(1));

        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_exits_when_store_dropped() {
        let store = Arc::new(SlidingWindowStore::new());
        let handle = store.start_sweeper(Duration::from_secs(1));
        drop(store);

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        assert!(handle.is_finished());
    }
}
