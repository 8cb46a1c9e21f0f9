//! Sliding-window rate limiting logic and state management.

mod backend;
mod clock;
mod decision;
mod keys;
mod limiter;
mod policy;
mod store;
mod sweeper;
mod window;

pub use backend::RateLimitBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{
    RateLimitDecision, RateLimitRejection, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET,
    HEADER_RETRY_AFTER,
};
pub use keys::{client_ip, ip_endpoint_key, user_key, KeyStrategy, RequestContext};
pub use limiter::RateLimiter;
pub use policy::{PolicyFile, PolicyRule, PolicyTable, RateLimitPolicy, TimeUnit};
pub use store::{SlidingWindowStore, DEFAULT_RETENTION};
pub use sweeper::SweepHandle;
pub use window::RateLimitEntry;

/// Names of the built-in policies.
pub mod presets {
    pub use super::policy::{ADMIN, API, AUTH, CONTACT, NEWSLETTER, SEARCH};
}
