//! File-backed subscriber setup.
//!
//! Writes structured JSONL logs to a central file that can be tailed by
//! external tools. Append-only, flushed per line.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Central log file location: `~/.waypost/logs/waypost.jsonl`.
///
/// Falls back to the current directory when no home directory is known.
pub(crate) fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".waypost")
        .join("logs")
        .join("waypost.jsonl")
}

/// Append-mode file writer shared by every log line.
#[derive(Clone)]
pub(crate) struct CentralLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl CentralLogWriter {
    pub(crate) fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        // Each line must be visible to `tail -f` as soon as it is written.
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// MakeWriter implementation for tracing-subscriber
#[derive(Clone)]
pub(crate) struct WriterFactory {
    writer: CentralLogWriter,
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber: JSONL file layer plus optional stderr.
pub(crate) fn init_file_subscriber(config: &LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);

    let (json_layer, open_error) = match CentralLogWriter::new(&log_path) {
        Ok(writer) => (
            Some(JsonLayer::new(
                config.service_name.clone(),
                WriterFactory { writer },
            )),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    // Without a file the stderr layer is the only output left.
    let stderr_layer = if config.also_stderr || open_error.is_some() {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr)
                .with_ansi(true),
        )
    } else {
        None
    };

    let result = tracing_subscriber::registry()
        .with(json_layer.map(|l| l.with_filter(env_filter(&config.default_level))))
        .with(stderr_layer.map(|l| l.with_filter(env_filter(&config.default_level))))
        .try_init();

    if result.is_err() {
        // A subscriber is already installed (tests, embedding applications).
        return;
    }

    match open_error {
        None => tracing::info!(
            log_path = %log_path.display(),
            service = %config.service_name,
            "observability initialized"
        ),
        Some(e) => tracing::warn!(
            log_path = %log_path.display(),
            error = %e,
            "log file unavailable, logging to stderr only"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::tempdir;

    #[test]
    fn test_central_log_writer_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("test.jsonl");

        let mut writer = CentralLogWriter::new(&path).unwrap();
        writer.write_all(b"test line\n").unwrap();

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "test line\n");
    }

    #[test]
    fn test_writer_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deeply").join("nested").join("test.jsonl");

        let writer = CentralLogWriter::new(&path);
        assert!(writer.is_ok());
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_json_layer_writes_structured_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layer.jsonl");
        let writer = CentralLogWriter::new(&path).unwrap();

        let subscriber = tracing_subscriber::registry().with(JsonLayer::new(
            "waypost-test".to_string(),
            WriterFactory { writer },
        ));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(fix_id = 42_i64, reachable = false, "send failed");
            tracing::info!(service = "relay", latitude = f64::NAN, "clashing field");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["service"], "waypost-test");
        assert_eq!(lines[0]["level"], "warn");
        assert_eq!(lines[0]["msg"], "send failed");
        assert_eq!(lines[0]["fix_id"], 42);
        assert_eq!(lines[0]["reachable"], false);

        assert_eq!(lines[1]["service"], "waypost-test");
        assert_eq!(lines[1]["field.service"], "relay");
        assert!(lines[1]["latitude"].is_null());
    }
}
