//! # Observability
//!
//! Logging setup shared by every Waypost binary.
//!
//! Services call [`init_with_config`] once at startup and then use the plain
//! `tracing` macros. Every event is written as one JSON object per line to a
//! central file (`~/.waypost/logs/waypost.jsonl` unless overridden), which
//! makes the delivery history of a device easy to follow:
//!
//! - `tail -f ~/.waypost/logs/waypost.jsonl | jq`
//! - `lnav ~/.waypost/logs/waypost.jsonl`
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "waypost".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!
//!     tracing::info!("service started");
//! }
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.waypost/logs/waypost.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with custom configuration.
///
/// If the log file cannot be opened the subscriber falls back to stderr
/// only, so logging never prevents a service from starting.
pub fn init_with_config(config: LogConfig) {
    file::init_file_subscriber(&config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }
}
