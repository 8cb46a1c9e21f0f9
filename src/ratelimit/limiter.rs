//! A policy bound to a shared store.

use std::sync::Arc;
use tracing::{debug, trace};

use super::backend::RateLimitBackend;
use super::decision::{RateLimitDecision, RateLimitRejection};
use super::keys::RequestContext;
use super::policy::RateLimitPolicy;

/// Applies one [`RateLimitPolicy`] against a shared store.
///
/// Keys are namespaced by policy name, so two policies never share quota
/// even when they derive the same caller key.
#[derive(Clone)]
pub struct RateLimiter {
    /// Shared rate limit state
    backend: Arc<dyn RateLimitBackend>,
    /// The policy enforced by this limiter
    policy: RateLimitPolicy,
}

impl RateLimiter {
    /// Create a limiter for `policy` over `backend`.
    pub fn new(backend: Arc<dyn RateLimitBackend>, policy: RateLimitPolicy) -> Self {
        Self { backend, policy }
    }

    /// Get the policy enforced by this limiter.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// The namespaced store key for a request.
    pub fn key_for(&self, ctx: &RequestContext<'_>) -> String {
        self.scoped_key(&self.policy.key_strategy.key_for(ctx))
    }

    /// Namespace an already-derived caller key.
    pub fn scoped_key(&self, caller: &str) -> String {
        format!("{}:{}", self.policy.name, caller)
    }

    /// Admit or reject a request, consuming quota on admission.
    pub async fn check(&self, ctx: &RequestContext<'_>) -> RateLimitDecision {
        let key = self.key_for(ctx);
        self.check_key(&key).await
    }

    /// Admit or reject under a precomputed store key.
    pub async fn check_key(&self, key: &str) -> RateLimitDecision {
        trace!(policy = %self.policy.name, key = %key, "Checking rate limit");

        let decision = self
            .backend
            .check_and_record(key, self.policy.window_ms(), self.policy.max_requests)
            .await;

        if !decision.admitted {
            debug!(
                policy = %self.policy.name,
                key = %key,
                limit = decision.limit,
                reset_at = decision.reset_at,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Quota status for a request, without consuming any.
    pub async fn status(&self, ctx: &RequestContext<'_>) -> RateLimitDecision {
        let key = self.key_for(ctx);
        self.status_key(&key).await
    }

    /// Quota status under a precomputed store key.
    pub async fn status_key(&self, key: &str) -> RateLimitDecision {
        self.backend
            .peek(key, self.policy.window_ms(), self.policy.max_requests)
            .await
    }

    /// The 429 body for a decision, carrying this policy's message.
    pub fn rejection(&self, decision: &RateLimitDecision) -> Option<RateLimitRejection> {
        decision.rejection(&self.policy.message)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .finish()
    }
}
