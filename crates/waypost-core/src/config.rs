//! Configuration management.
//!
//! The configuration is read once at startup and handed to the delivery
//! controller as an immutable snapshot.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default collector endpoint (OsmAnd protocol port of a local server).
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5055";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Delay between a failed drain step and the next attempt.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 30;

const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Collector endpoint fixes are delivered to.
    pub endpoint: String,
    /// Origin tag stamped on new fixes; queued fixes with another tag are orphans.
    pub device_id: String,
    /// Persist fixes before sending them. When off, fixes are sent once and dropped on failure.
    pub buffer: bool,
    /// Send a best-effort copy of each fix to `side_channel_destination`.
    pub side_channel_enabled: bool,
    /// Destination of the side-channel copy.
    pub side_channel_destination: Option<String>,
    /// Fixed retry delay after a failed read, send or delete.
    pub retry_delay_secs: u64,
    /// How often the reachability probe checks the collector.
    pub probe_interval_secs: u64,
    /// Timeout applied by the HTTP transport to each request.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            device_id: String::new(),
            buffer: true,
            side_channel_enabled: false,
            side_channel_destination: None,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load `path`, which must exist, then apply `WAYPOST_*` overrides.
    pub fn load(path: &Path) -> CoreResult<Self> {
        Self::from_sources(path, true, |key| std::env::var(key).ok())
    }

    /// Load `path`, using defaults when it does not exist, then apply
    /// `WAYPOST_*` overrides.
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        Self::from_sources(path, false, |key| std::env::var(key).ok())
    }

    fn from_sources<F>(path: &Path, required: bool, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if required || path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(lookup);
        Ok(config)
    }

    /// Read a configuration file as is.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (`WAYPOST_LOG_LEVEL`,
    /// `WAYPOST_ENDPOINT`, `WAYPOST_DEVICE_ID`). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(log_level) = value("WAYPOST_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(endpoint) = value("WAYPOST_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(device_id) = value("WAYPOST_DEVICE_ID") {
            self.device_id = device_id;
        }
    }

    /// Get the endpoint as a parsed URL.
    pub fn endpoint_url(&self) -> CoreResult<Url> {
        Url::parse(&self.endpoint).map_err(CoreError::from)
    }

    /// Check that the configuration can drive a controller.
    pub fn validate(&self) -> CoreResult<()> {
        let url = self.endpoint_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::Config(format!(
                "endpoint must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.device_id.trim().is_empty() {
            return Err(CoreError::Config("device_id must not be empty".to_string()));
        }
        if self.side_channel_enabled
            && self
                .side_channel_destination
                .as_deref()
                .map_or(true, |d| d.trim().is_empty())
        {
            return Err(CoreError::Config(
                "side channel is enabled but has no destination".to_string(),
            ));
        }
        for (name, secs) in [
            ("retry_delay_secs", self.retry_delay_secs),
            ("probe_interval_secs", self.probe_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(CoreError::Config(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
