//! Logging initialization.
//!
//! Thin wrapper over the observability crate: structured JSONL goes to
//! `~/.waypost/logs/waypost.jsonl`, with a compact copy on stderr for
//! foreground runs.

use std::path::PathBuf;

/// Initialize the logging system for the `waypost` service.
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(observability::LogConfig {
        service_name: "waypost".into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });
}
