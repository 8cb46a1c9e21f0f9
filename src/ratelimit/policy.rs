//! Named rate limit policies and YAML overrides.
//!
//! The portal ships a fixed table of presets. An optional policy file can
//! replace a preset's numbers or add new named policies:
//!
//! ```yaml
//! policies:
//!   - name: auth
//!     requests_per_unit: 10
//!     unit: hour
//!   - name: comments
//!     requests_per_unit: 3
//!     window_ms: 30000
//!     key: user
//!     message: Please wait before commenting again.
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::keys::KeyStrategy;
use crate::error::{AkhbarnaError, Result};

/// Login and registration attempts.
pub const AUTH: &str = "auth";
/// Contact form submissions.
pub const CONTACT: &str = "contact";
/// Newsletter subscription attempts.
pub const NEWSLETTER: &str = "newsletter";
/// Article search queries.
pub const SEARCH: &str = "search";
/// Generic API calls.
pub const API: &str = "api";
/// Admin and moderation actions.
pub const ADMIN: &str = "admin";

const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

/// A named quota: at most `max_requests` per trailing `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Policy name, also the key namespace
    pub name: String,
    /// Length of the trailing window
    pub window: Duration,
    /// Requests admitted per window
    pub max_requests: u64,
    /// How callers are partitioned
    pub key_strategy: KeyStrategy,
    /// Human-readable text for rejection bodies
    pub message: String,
}

impl RateLimitPolicy {
    /// Create a policy with the generic rejection message.
    pub fn new(
        name: impl Into<String>,
        window: Duration,
        max_requests: u64,
        key_strategy: KeyStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            window,
            max_requests,
            key_strategy,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }

    /// Set the rejection message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}

/// The set of policies available to route handlers, by name.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: BTreeMap<String, RateLimitPolicy>,
}

impl PolicyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The portal's built-in presets.
    pub fn presets() -> Self {
        const MINUTE: Duration = Duration::from_secs(60);
        const HOUR: Duration = Duration::from_secs(3600);

        let mut table = Self::new();
        table.insert(
            RateLimitPolicy::new(AUTH, 15 * MINUTE, 5, KeyStrategy::Ip).with_message(
                "Too many authentication attempts, please try again in 15 minutes.",
            ),
        );
        table.insert(
            RateLimitPolicy::new(CONTACT, HOUR, 3, KeyStrategy::Ip)
                .with_message("Too many contact form submissions, please try again later."),
        );
        table.insert(
            RateLimitPolicy::new(NEWSLETTER, HOUR, 5, KeyStrategy::Ip)
                .with_message("Too many subscription attempts, please try again later."),
        );
        table.insert(
            RateLimitPolicy::new(SEARCH, MINUTE, 30, KeyStrategy::IpEndpoint)
                .with_message("Too many search requests, please slow down."),
        );
        table.insert(RateLimitPolicy::new(API, 15 * MINUTE, 100, KeyStrategy::User));
        table.insert(
            RateLimitPolicy::new(ADMIN, MINUTE, 30, KeyStrategy::User)
                .with_message("Too many admin actions, please slow down."),
        );
        table
    }

    /// Add or replace a policy.
    pub fn insert(&mut self, policy: RateLimitPolicy) {
        self.policies.insert(policy.name.clone(), policy);
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(name)
    }

    /// Iterate over policies in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RateLimitPolicy> {
        self.policies.values()
    }

    /// Number of policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// The largest window across all policies.
    pub fn max_window(&self) -> Option<Duration> {
        self.iter().map(|policy| policy.window).max()
    }

    /// Apply every rule in a policy file.
    ///
    /// A rule naming an existing policy replaces its numbers and keeps any
    /// key strategy or message the rule leaves out.
    pub fn apply(&mut self, file: &PolicyFile) -> Result<()> {
        for rule in &file.policies {
            let policy = rule.to_policy(self.get(&rule.name))?;
            info!(
                policy = %policy.name,
                window_ms = policy.window_ms(),
                max_requests = policy.max_requests,
                key = ?policy.key_strategy,
                "Applying rate limit policy override"
            );
            self.insert(policy);
        }
        Ok(())
    }

    /// The presets with overrides from a YAML file applied.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut table = Self::presets();
        table.apply(&PolicyFile::from_file(path)?)?;
        Ok(table)
    }
}

/// Contents of a policy override file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub policies: Vec<PolicyRule>,
}

impl PolicyFile {
    /// Load a policy file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a policy file from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| AkhbarnaError::Policy(format!("Failed to parse policy file: {}", e)))
    }
}

/// One entry of a policy file.
///
/// Exactly one of `unit` and `window_ms` sets the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Policy name
    pub name: String,
    /// Requests admitted per window
    pub requests_per_unit: u64,
    /// Window as a whole time unit
    #[serde(default)]
    pub unit: Option<TimeUnit>,
    /// Window in milliseconds
    #[serde(default)]
    pub window_ms: Option<u64>,
    /// Key strategy
    #[serde(default)]
    pub key: Option<KeyStrategy>,
    /// Rejection message
    #[serde(default)]
    pub message: Option<String>,
}

impl PolicyRule {
    fn to_policy(&self, existing: Option<&RateLimitPolicy>) -> Result<RateLimitPolicy> {
        let window = match (self.unit, self.window_ms) {
            (Some(unit), None) => unit.duration(),
            (None, Some(ms)) => Duration::from_millis(ms),
            _ => {
                return Err(AkhbarnaError::Policy(format!(
                    "policy '{}' must set exactly one of unit or window_ms",
                    self.name
                )))
            }
        };

        let key_strategy = self
            .key
            .or(existing.map(|p| p.key_strategy))
            .unwrap_or(KeyStrategy::Ip);
        let message = self
            .message
            .clone()
            .or_else(|| existing.map(|p| p.message.clone()))
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        Ok(RateLimitPolicy::new(&*self.name, window, self.requests_per_unit, key_strategy)
            .with_message(message))
    }
}

/// Whole time units accepted in policy files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}
