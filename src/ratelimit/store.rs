//! In-process sliding-window store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::RateLimitBackend;
use super::clock::{Clock, SystemClock};
use super::decision::RateLimitDecision;
use super::sweeper::SweepHandle;
use super::window::RateLimitEntry;

/// Retention used when no policy table is available to derive one from
/// (twice a one-hour window).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(2 * 3600);

/// Sliding-window rate limit state for every key seen by this process.
///
/// Each check runs its prune-decide-append sequence while holding the
/// entry's shard lock, so concurrent checks for one key never over-admit.
/// State is per process: replicas behind a load balancer each enforce
/// their own quota.
pub struct SlidingWindowStore {
    /// Entries indexed by fully-qualified key
    entries: DashMap<String, RateLimitEntry>,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Entries idle for at least this long are removed by [`sweep`](Self::sweep)
    retention: Duration,
}

impl SlidingWindowStore {
    /// Create a store on the system clock with the default retention.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Set how long an idle entry survives before the sweep removes it.
    ///
    /// Entries whose window is longer than half of this still survive twice
    /// their own window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// The configured retention.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Admit and record a request for `key`, or reject it without recording.
    ///
    /// An empty key is a valid, shared bucket.
    pub fn check_and_record(
        &self,
        key: &str,
        window_ms: u64,
        max_requests: u64,
    ) -> RateLimitDecision {
        let now = self.clock.now_millis();

        let decision = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, window_ms, max_requests, "Creating rate limit entry");
                RateLimitEntry::new(now, window_ms)
            })
            .record(now, window_ms, max_requests);

        trace!(
            key = %key,
            admitted = decision.admitted,
            remaining = decision.remaining,
            reset_at = decision.reset_at,
            "Checked rate limit"
        );

        decision
    }

    /// The decision [`check_and_record`](Self::check_and_record) would return
    /// right now. Never mutates the store.
    pub fn peek(&self, key: &str, window_ms: u64, max_requests: u64) -> RateLimitDecision {
        let now = self.clock.now_millis();

        match self.entries.get(key) {
            Some(entry) => entry.peek(now, window_ms, max_requests),
            None => RateLimitEntry::new(now, window_ms).peek(now, window_ms, max_requests),
        }
    }

    /// Remove every entry idle for at least the retention period and at
    /// least twice its own window, so no live timestamp is ever dropped.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let retention_ms = u64::try_from(self.retention.as_millis()).unwrap_or(u64::MAX);
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            let stale = entry.is_stale(now, retention_ms);
            if stale {
                removed += 1;
            }
            !stale
        });

        removed
    }

    /// Forget a single key. Returns whether it was present.
    pub fn reset(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start the periodic sweep on the current tokio runtime.
    ///
    /// The task holds only a weak reference and ends on its own once the
    /// store is dropped.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        SweepHandle::spawn(Arc::downgrade(self), interval)
    }
}

impl Default for SlidingWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SlidingWindowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowStore")
            .field("entries", &self.entries.len())
            .field("retention", &self.retention)
            .finish()
    }
}

#[async_trait]
impl RateLimitBackend for SlidingWindowStore {
    async fn check_and_record(
        &self,
        key: &str,
        window_ms: u64,
        max_requests: u64,
    ) -> RateLimitDecision {
        SlidingWindowStore::check_and_record(self, key, window_ms, max_requests)
    }

    async fn peek(&self, key: &str, window_ms: u64, max_requests: u64) -> RateLimitDecision {
        SlidingWindowStore::peek(self, key, window_ms, max_requests)
    }
}
