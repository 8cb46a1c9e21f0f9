//! Configuration management for the rate limiting service.
//!
//! Values come from an optional YAML file and are then overridden by
//! `AKHBARNA__<SECTION>__<FIELD>` environment variables, e.g.
//! `AKHBARNA__SERVER__HTTP_ADDR=0.0.0.0:8080`.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::warn;

use crate::error::Result;
use crate::ratelimit::{PolicyTable, DEFAULT_RETENTION};

const ENV_PREFIX: &str = "AKHBARNA";

/// Main configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AkhbarnaConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a YAML file of policy overrides
    #[serde(default)]
    pub policies_path: Option<String>,

    /// How often idle entries are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// How long an idle entry survives, in seconds. Defaults to twice the
    /// largest policy window and is never shorter than that.
    #[serde(default)]
    pub retention_secs: Option<u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            policies_path: None,
            sweep_interval_secs: default_sweep_interval(),
            retention_secs: None,
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Interval between background sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Idle-entry retention for the given policy table.
    ///
    /// A configured value below twice the largest window is raised to it, so
    /// the sweep cannot drop timestamps that still count against a quota.
    pub fn retention(&self, policies: &PolicyTable) -> Duration {
        let floor = policies.max_window().map(|window| window * 2);
        match (self.retention_secs, floor) {
            (Some(secs), Some(floor)) if Duration::from_secs(secs) < floor => {
                warn!(
                    retention_secs = secs,
                    floor_secs = floor.as_secs(),
                    "Retention shorter than twice the largest policy window, raising it"
                );
                floor
            }
            (Some(secs), _) => Duration::from_secs(secs),
            (None, floor) => floor.unwrap_or(DEFAULT_RETENTION),
        }
    }
}

impl AkhbarnaConfig {
    /// Load configuration from an optional file plus environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        Self::finish(builder)
    }

    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Load configuration from a YAML string plus environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::finish(Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)))
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
