//! File system paths used by Waypost.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths (everything lives under `~/.waypost`).
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.waypost`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".waypost"),
        })
    }

    #[cfg(test)]
    fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the config file path (~/.waypost/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the outbox database path (~/.waypost/waypost.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("waypost.sqlite")
    }

    /// Get the logs directory (~/.waypost/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.waypost/logs/waypost.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("waypost.jsonl")
    }
}
