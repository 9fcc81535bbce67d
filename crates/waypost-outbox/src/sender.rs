//! Transport interface and the OsmAnd-style HTTP sender.

use crate::{OutboxError, OutboxResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;
use waypost_database::LocationFix;

/// One fix, formatted and ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    /// Full request URL, fix fields included.
    pub url: Url,
    /// The fix the request was built from.
    pub fix: LocationFix,
}

/// Formats fixes into requests and performs the network call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Build the request for `fix`. Pure, no I/O.
    fn format_request(&self, endpoint: &Url, fix: &LocationFix) -> OutboxResult<DeliveryRequest>;

    /// Send a request. `Ok` means the collector accepted the fix.
    async fn send_request(&self, request: DeliveryRequest) -> OutboxResult<()>;
}

/// Sends fixes to an OsmAnd-compatible collector.
///
/// Each fix is one `POST` with the fields in the query string:
/// `id`, `timestamp` (unix seconds), `lat`, `lon`, `accuracy`, `batt`,
/// `charge` and `mock`. Any 2xx response is success.
pub struct OsmAndTransport {
    client: Client,
}

impl OsmAndTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> OutboxResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for OsmAndTransport {
    fn format_request(&self, endpoint: &Url, fix: &LocationFix) -> OutboxResult<DeliveryRequest> {
        if endpoint.cannot_be_a_base() {
            return Err(OutboxError::InvalidRequest(format!(
                "endpoint cannot carry a query: {}",
                endpoint
            )));
        }
        fix.validate().map_err(OutboxError::InvalidRequest)?;

        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("id", &fix.device_id)
            .append_pair("timestamp", &fix.captured_at.timestamp().to_string())
            .append_pair("lat", &fix.latitude.to_string())
            .append_pair("lon", &fix.longitude.to_string())
            .append_pair("accuracy", &fix.accuracy.to_string())
            .append_pair("batt", &fix.battery.to_string())
            .append_pair("charge", &fix.charging.to_string())
            .append_pair("mock", &fix.mock.to_string());

        Ok(DeliveryRequest {
            url,
            fix: fix.clone(),
        })
    }

    async fn send_request(&self, request: DeliveryRequest) -> OutboxResult<()> {
        debug!(
            url = %request.url,
            captured_at = %request.fix.captured_at,
            "Sending fix"
        );

        let response = self.client.post(request.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OutboxError::Send(format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }
}
