//! Best-effort out-of-band copies of fixes.

use crate::{OutboxError, OutboxResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use waypost_database::LocationFix;

/// Sends a snapshot of a fix somewhere other than the collector.
///
/// Never part of the delivery guarantee: the controller fires and forgets.
#[async_trait]
pub trait SideChannelNotifier: Send + Sync {
    async fn notify(&self, fix: &LocationFix, destination: &str) -> OutboxResult<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FixSnapshot<'a> {
    device_id: &'a str,
    captured_at: i64,
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    battery: f64,
    charging: bool,
    mock: bool,
}

impl<'a> From<&'a LocationFix> for FixSnapshot<'a> {
    fn from(fix: &'a LocationFix) -> Self {
        Self {
            device_id: &fix.device_id,
            captured_at: fix.captured_at.timestamp_millis(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            battery: fix.battery,
            charging: fix.charging,
            mock: fix.mock,
        }
    }
}

/// POSTs a JSON snapshot of each fix to the destination URL.
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> OutboxResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SideChannelNotifier for WebhookNotifier {
    async fn notify(&self, fix: &LocationFix, destination: &str) -> OutboxResult<()> {
        debug!(destination = %destination, "Sending side channel copy");

        let response = self
            .client
            .post(destination)
            .json(&FixSnapshot::from(fix))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OutboxError::Send(format!("side channel HTTP {}", status)));
        }
        Ok(())
    }
}
