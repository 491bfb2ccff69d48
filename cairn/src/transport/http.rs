//! HTTP transport for the collector Events API
//!
//! Implements the collector wire protocol: events are POSTed one at a time
//! to `/api/v1/events` with the public key credential in the `X-Public-Key`
//! header; reachability is probed against `/api/v1/health`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;

use crate::config::TelemetryConfig;
use crate::error::{Error, Result};
use crate::types::Event;

use super::{SendOutcome, Transport};

/// Response body from POST /api/v1/events
///
/// The server may override the client-generated event id.
#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(rename = "eventId")]
    event_id: Option<String>,
}

/// HTTP client for the collector API
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a new transport from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required
    /// fields; this is the fatal construction-time check.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        config.validate()?;
        let base_url = config.base_url()?;

        let public_key = config
            .public_key
            .clone()
            .ok_or_else(|| Error::Config("telemetry.public_key is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Public-Key",
            HeaderValue::from_str(&public_key)
                .map_err(|e| Error::Config(format!("invalid public_key: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, event: &Event) -> SendOutcome {
        let url = format!("{}/api/v1/events", self.base_url);

        let response = match self.http_client.post(&url).json(event).send().await {
            Ok(response) => response,
            Err(e) => {
                return SendOutcome::Failure {
                    error: format!("HTTP request failed: {}", e),
                }
            }
        };

        let status = response.status();

        if status.is_success() {
            // Body is optional on success; a missing or unparsable body
            // just means no server-assigned id.
            let event_id = response
                .json::<EventsResponse>()
                .await
                .ok()
                .and_then(|body| body.event_id);
            SendOutcome::Success { event_id }
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            SendOutcome::Failure {
                error: format!("API error ({}): {}", status, error_text),
            }
        }
    }

    async fn is_online(&self) -> bool {
        let url = format!("{}/api/v1/health", self.base_url);

        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
