//! Per-key sliding window of admission timestamps.

use std::collections::VecDeque;

use super::decision::RateLimitDecision;

/// Admission history for one key.
///
/// Timestamps are epoch milliseconds in insertion order, which is also
/// chronological order. A timestamp `t` counts against the quota while
/// `t + window > now`; the boundary moves with every call rather than at
/// fixed clock-aligned buckets.
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    /// Admitted requests still inside the window
    timestamps: VecDeque<u64>,
    /// Instant after which the entry is expired if unused
    window_end: u64,
    /// Last admitted or attempted request
    last_seen: u64,
    /// Window length used on the last touch
    window_ms: u64,
}

impl RateLimitEntry {
    /// Create an empty entry first touched at `now`.
    pub fn new(now: u64, window_ms: u64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            window_end: now.saturating_add(window_ms),
            last_seen: now,
            window_ms,
        }
    }

    /// Prune, then either admit and record `now` or reject without recording.
    pub fn record(&mut self, now: u64, window_ms: u64, max_requests: u64) -> RateLimitDecision {
        if self.is_expired(now) {
            self.timestamps.clear();
        }

        while self
            .timestamps
            .front()
            .is_some_and(|&t| t.saturating_add(window_ms) <= now)
        {
            self.timestamps.pop_front();
        }

        let decision = decide(
            self.timestamps.len() as u64,
            self.timestamps.front().copied(),
            now,
            window_ms,
            max_requests,
        );

        if decision.admitted {
            self.timestamps.push_back(now);
        }
        self.last_seen = now;
        self.window_end = now.saturating_add(window_ms);
        self.window_ms = window_ms;

        decision
    }

    /// The decision [`record`](Self::record) would return at `now`, computed
    /// without mutating anything.
    pub fn peek(&self, now: u64, window_ms: u64, max_requests: u64) -> RateLimitDecision {
        if self.is_expired(now) {
            return decide(0, None, now, window_ms, max_requests);
        }

        let mut live = self
            .timestamps
            .iter()
            .copied()
            .skip_while(|&t| t.saturating_add(window_ms) <= now);
        let oldest = live.next();
        let count = oldest.map_or(0, |_| 1 + live.count() as u64);

        decide(count, oldest, now, window_ms, max_requests)
    }

    /// Whether the window has fully elapsed since the last activity.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.window_end
    }

    /// Last admitted or attempted request.
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Window length used on the last touch.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Whether the entry may be dropped at `now`: idle for at least twice its
    /// own window and at least `retention_ms`.
    pub fn is_stale(&self, now: u64, retention_ms: u64) -> bool {
        let horizon = retention_ms.max(self.window_ms.saturating_mul(2));
        self.last_seen.saturating_add(horizon) <= now
    }

    /// Number of stored timestamps (not pruned).
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether no timestamps are stored.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Admission decision given the live count and the oldest live timestamp.
fn decide(
    count: u64,
    oldest: Option<u64>,
    now: u64,
    window_ms: u64,
    max_requests: u64,
) -> RateLimitDecision {
    // An admission appends `now`, so with no live timestamps the new one is
    // the oldest.
    let reset_at = oldest.unwrap_or(now).saturating_add(window_ms);

    if count < max_requests {
        RateLimitDecision::admitted(max_requests, max_requests - (count + 1), reset_at)
    } else {
        RateLimitDecision::rejected(max_requests, reset_at, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_within_limit() {
        let mut entry = RateLimitEntry::new(0, 1_000);

        let decision = entry.record(0, 1_000, 3);
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, 1_000);
        assert_eq!(decision.retry_after_secs, None);

        let decision = entry.record(400, 1_000, 3);
        assert_eq!(decision.remaining, 1);
        // Reset tracks the oldest live timestamp, not the newest.
        assert_eq!(decision.reset_at, 1_000);
        assert_eq!(entry.len(), 2);
    }

    #[test]
    fn test_record_rejects_without_appending() {
        let mut entry = RateLimitEntry::new(0, 1_000);
        assert!(entry.record(0, 1_000, 1).admitted);

        let decision = entry.record(250, 1_000, 1);
        assert!(!decision.admitted);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, 1_000);
        assert_eq!(decision.retry_after_secs, Some(1));
        assert_eq!(entry.len(), 1);
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let mut entry = RateLimitEntry::new(0, 1_000);
        assert!(entry.record(0, 1_000, 1).admitted);

        assert!(!entry.record(999, 1_000, 1).admitted);
        assert!(entry.record(1_000, 1_000, 1).admitted);
        assert_eq!(entry.len(), 1);
    }

    #[test]
    fn test_zero_quota_always_rejects() {
        let mut entry = RateLimitEntry::new(5_000, 2_500);

        let decision = entry.record(5_000, 2_500, 0);
        assert!(!decision.admitted);
        assert_eq!(decision.reset_at, 7_500);
        assert_eq!(decision.retry_after_secs, Some(3));
        assert!(entry.is_empty());
    }

    #[test]
    fn test_expired_entry_starts_fresh() {
        let mut entry = RateLimitEntry::new(0, 1_000);
        entry.record(0, 1_000, 2);
        entry.record(10, 1_000, 2);

        assert!(entry.is_expired(1_010));
        let decision = entry.record(5_000, 1_000, 2);
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 1);
        assert_eq!(entry.len(), 1);
    }

    #[test]
    fn test_rejected_attempt_updates_last_seen() {
        let mut entry = RateLimitEntry::new(0, 1_000);
        entry.record(0, 1_000, 1);
        entry.record(700, 1_000, 1);

        assert_eq!(entry.last_seen(), 700);
        assert!(!entry.is_expired(1_500));
    }

    #[test]
    fn test_stale_needs_twice_own_window() {
        let mut entry = RateLimitEntry::new(0, 900_000);
        entry.record(0, 900_000, 5);
        assert_eq!(entry.window_ms(), 900_000);

        // A short retention never undercuts the entry's own window.
        assert!(!entry.is_stale(10_000, 10_000));
        assert!(!entry.is_stale(1_799_999, 10_000));
        assert!(entry.is_stale(1_800_000, 10_000));

        // A longer retention wins over the window.
        assert!(!entry.is_stale(1_800_000, 3_600_000));
        assert!(entry.is_stale(3_600_000, 3_600_000));
    }

    #[test]
    fn test_peek_matches_record() {
        let mut entry = RateLimitEntry::new(0, 1_000);
        entry.record(0, 1_000, 2);
        entry.record(300, 1_000, 2);

        for now in [500, 999, 1_000, 1_299, 1_300, 4_000] {
            let peeked = entry.peek(now, 1_000, 2);
            let mut copy = entry.clone();
            assert_eq!(peeked, copy.record(now, 1_000, 2), "diverged at {}", now);
        }
        assert_eq!(entry.len(), 2);
    }
}
