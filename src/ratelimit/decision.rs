//! Admission decisions and their translation into a rejection payload.

use serde::{Deserialize, Serialize};

/// Header carrying the policy quota.
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
/// Header carrying the quota left in the current window.
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Header carrying the reset instant in epoch milliseconds.
pub const HEADER_RESET: &str = "x-ratelimit-reset";
/// Standard retry hint, in whole seconds.
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// The `error` field of every rejection body.
pub const REJECTION_ERROR: &str = "Rate limit exceeded";

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Quota per window
    pub limit: u64,
    /// Quota left after this decision
    pub remaining: u64,
    /// Epoch milliseconds at which the oldest counted request leaves the window
    pub reset_at: u64,
    /// Seconds to wait before retrying; present only on rejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    /// Build an admission.
    pub fn admitted(limit: u64, remaining: u64, reset_at: u64) -> Self {
        Self {
            admitted: true,
            limit,
            remaining,
            reset_at,
            retry_after_secs: None,
        }
    }

    /// Build a rejection. The retry hint rounds up so that waiting it out
    /// always lands at or after `reset_at`.
    pub fn rejected(limit: u64, reset_at: u64, now: u64) -> Self {
        Self {
            admitted: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after_secs: Some(reset_at.saturating_sub(now).div_ceil(1000)),
        }
    }

    /// Header name/value pairs a response should carry for this decision.
    ///
    /// Admissions get the three `X-RateLimit-*` headers; rejections add
    /// `Retry-After`.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset_at.to_string()),
        ];
        if let Some(retry_after) = self.retry_after_secs {
            headers.push((HEADER_RETRY_AFTER, retry_after.to_string()));
        }
        headers
    }

    /// The JSON body for a rejected request, or `None` when admitted.
    pub fn rejection(&self, message: &str) -> Option<RateLimitRejection> {
        if self.admitted {
            return None;
        }

        Some(RateLimitRejection {
            error: REJECTION_ERROR.to_string(),
            message: message.to_string(),
            limit: self.limit,
            remaining: self.remaining,
            reset_time: self.reset_at,
            retry_after: self.retry_after_secs.unwrap_or_default(),
        })
    }
}

/// Body of an HTTP 429 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRejection {
    pub error: String,
    pub message: String,
    pub limit: u64,
    pub remaining: u64,
    pub reset_time: u64,
    pub retry_after: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_rounds_retry_after_up() {
        let decision = RateLimitDecision::rejected(5, 10_001, 9_000);
        assert_eq!(decision.retry_after_secs, Some(2));
        assert_eq!(decision.remaining, 0);
        assert!(!decision.admitted);

        let exact = RateLimitDecision::rejected(5, 10_000, 9_000);
        assert_eq!(exact.retry_after_secs, Some(1));
    }

    #[test]
    fn test_admitted_headers_omit_retry_after() {
        let decision = RateLimitDecision::admitted(10, 7, 123_456);
        let headers = decision.headers();

        assert_eq!(
            headers,
            vec![
                (HEADER_LIMIT, "10".to_string()),
                (HEADER_REMAINING, "7".to_string()),
                (HEADER_RESET, "123456".to_string()),
            ]
        );
    }

    #[test]
    fn test_rejected_headers_include_retry_after() {
        let decision = RateLimitDecision::rejected(5, 60_000, 30_500);
        let headers = decision.headers();

        assert_eq!(headers.len(), 4);
        assert_eq!(headers[1], (HEADER_REMAINING, "0".to_string()));
        assert_eq!(headers[3], (HEADER_RETRY_AFTER, "30".to_string()));
    }

    #[test]
    fn test_rejection_payload() {
        let decision = RateLimitDecision::admitted(5, 4, 1_000);
        assert!(decision.rejection("nope").is_none());

        let decision = RateLimitDecision::rejected(5, 900_000, 0);
        let body = decision.rejection("Too many login attempts").unwrap();

        assert_eq!(body.error, "Rate limit exceeded");
        assert_eq!(body.message, "Too many login attempts");
        assert_eq!(body.limit, 5);
        assert_eq!(body.remaining, 0);
        assert_eq!(body.reset_time, 900_000);
        assert_eq!(body.retry_after, 900);
    }

    #[test]
    fn test_rejection_json_field_names() {
        let body = RateLimitDecision::rejected(3, 5_000, 1_000)
            .rejection("slow down")
            .unwrap();
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["error"], "Rate limit exceeded");
        assert_eq!(json["resetTime"], 5_000);
        assert_eq!(json["retryAfter"], 4);
        assert_eq!(json["remaining"], 0);
    }
}
