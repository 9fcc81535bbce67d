//! Fix acquisition sources.

use crate::controller::ControllerHandle;
use crate::AcquisitionError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use waypost_database::LocationFix;

/// Produces location fixes and hands them to the controller.
pub trait FixSource: Send + Sync {
    /// Begin delivering fixes to `handle`. Failure is reported, never fatal.
    fn start_updates(&self, handle: ControllerHandle) -> Result<(), AcquisitionError>;

    fn stop_updates(&self);
}

/// Where [`JsonLinesFixSource`] reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixInput {
    Stdin,
    File(PathBuf),
}

/// One input line. Telemetry fields are optional; a missing `time` means now.
#[derive(Debug, Deserialize)]
struct FixLine {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    accuracy: f64,
    #[serde(default)]
    battery: f64,
    #[serde(default)]
    charging: bool,
    #[serde(default)]
    mock: bool,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

/// Reads fixes as JSON lines from a file or stdin:
///
/// ```text
/// {"latitude":52.52,"longitude":13.405,"accuracy":4.5,"battery":87,"time":"2024-05-01T12:00:00Z"}
/// ```
///
/// Every fix is stamped with the configured device id. Blank lines are
/// skipped and malformed lines are reported as acquisition errors.
pub struct JsonLinesFixSource {
    input: FixInput,
    device_id: String,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JsonLinesFixSource {
    pub fn new(input: FixInput, device_id: impl Into<String>) -> Self {
        Self {
            input,
            device_id: device_id.into(),
            task: Mutex::new(None),
        }
    }
}

impl FixSource for JsonLinesFixSource {
    fn start_updates(&self, handle: ControllerHandle) -> Result<(), AcquisitionError> {
        let device_id = self.device_id.clone();
        let task = match &self.input {
            FixInput::File(path) => {
                let file = std::fs::File::open(path)?;
                info!(path = %path.display(), "Reading fixes from file");
                let reader = BufReader::new(tokio::fs::File::from_std(file));
                tokio::spawn(read_fixes(reader, device_id, handle))
            }
            FixInput::Stdin => {
                info!("Reading fixes from stdin");
                let reader = BufReader::new(tokio::io::stdin());
                tokio::spawn(read_fixes(reader, device_id, handle))
            }
        };

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn stop_updates(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Fix source stopped");
        }
    }
}

async fn read_fixes<R>(reader: R, device_id: String, handle: ControllerHandle)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let mut lines = reader.lines();
    loop {
        let delivered = match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match parse_fix_line(&line, &device_id) {
                Ok(fix) => handle.on_fix(fix),
                Err(e) => handle.on_acquisition_error(e),
            },
            Ok(None) => {
                info!("Fix input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read fix input");
                let _ = handle.on_acquisition_error(AcquisitionError::from(e));
                break;
            }
        };

        if delivered.is_err() {
            debug!("Controller gone, stopping fix source");
            break;
        }
    }
}

/// Parse one JSON line into a fix for `device_id`.
pub fn parse_fix_line(line: &str, device_id: &str) -> Result<LocationFix, AcquisitionError> {
    let raw: FixLine =
        serde_json::from_str(line).map_err(|e| AcquisitionError::Malformed(e.to_string()))?;

    let fix = LocationFix {
        device_id: device_id.to_string(),
        captured_at: raw.time.unwrap_or_else(Utc::now),
        latitude: raw.latitude,
        longitude: raw.longitude,
        accuracy: raw.accuracy,
        battery: raw.battery,
        charging: raw.charging,
        mock: raw.mock,
    };
    fix.validate().map_err(AcquisitionError::Malformed)?;
    Ok(fix)
}
