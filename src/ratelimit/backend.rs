//! Store trait for abstracting the in-process store from networked ones.

use async_trait::async_trait;

use super::decision::RateLimitDecision;

/// Trait for rate limit store implementations.
///
/// The in-process [`SlidingWindowStore`](super::SlidingWindowStore) completes
/// every call without suspending; the trait is async so that a remote cache
/// can sit behind the same interface without changing call sites.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Admit and record a request for `key`, or reject it without recording.
    async fn check_and_record(
        &self,
        key: &str,
        window_ms: u64,
        max_requests: u64,
    ) -> RateLimitDecision;

    /// Compute the decision `check_and_record` would return, without
    /// consuming quota.
    async fn peek(&self, key: &str, window_ms: u64, max_requests: u64) -> RateLimitDecision;
}
