//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A location fix as produced by acquisition, before it has a queue id.
///
/// Fixes are never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Origin tag of the device or session that produced the fix.
    pub device_id: String,
    /// When the fix was taken.
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
    /// Battery level in percent.
    pub battery: f64,
    pub charging: bool,
    /// Produced by a mock/simulated location provider.
    pub mock: bool,
}

impl LocationFix {
    /// Reject fixes that cannot be stored or transmitted meaningfully.
    pub fn validate(&self) -> Result<(), String> {
        if self.device_id.trim().is_empty() {
            return Err("device_id must not be empty".to_string());
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(format!("latitude out of range: {}", self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(format!("longitude out of range: {}", self.longitude));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(format!("accuracy must be a non-negative number: {}", self.accuracy));
        }
        if !self.battery.is_finite() {
            return Err(format!("battery must be a number: {}", self.battery));
        }
        Ok(())
    }
}

/// A fix that has been appended to the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFix {
    /// Queue sequence id, assigned on insert. The only deletion key.
    pub id: i64,
    pub fix: LocationFix,
    /// When the row was inserted.
    pub queued_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) fn sample_fix(device_id: &str, latitude: f64) -> LocationFix {
    LocationFix {
        device_id: device_id.to_string(),
        captured_at: DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123)
            .unwrap_or_else(Utc::now),
        latitude,
        longitude: 13.4050,
        accuracy: 4.5,
        battery: 87.0,
        charging: false,
        mock: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_sample() {
        assert!(sample_fix("device-1", 52.52).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut fix = sample_fix("device-1", 91.0);
        assert!(fix.validate().is_err());

        fix.latitude = 10.0;
        fix.longitude = f64::NAN;
        assert!(fix.validate().is_err());

        fix.longitude = 10.0;
        fix.accuracy = -1.0;
        assert!(fix.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_device() {
        assert!(sample_fix("  ", 10.0).validate().is_err());
    }

    #[test]
    fn test_fix_serializes_with_rfc3339_time() {
        let json = serde_json::to_value(sample_fix("device-1", 52.52)).unwrap();
        assert_eq!(json["device_id"], "device-1");
        let captured = json["captured_at"].as_str().unwrap();
        assert!(captured.starts_with("2023-11-14T22:13:20.123"));
    }
}
