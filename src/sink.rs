//! HTTP ingestion sink for validated readings
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::DeliveryError;
use crate::reading::WeatherReading;

/// Default request timeout for a single POST to the sink
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of response body characters kept in a delivery error
pub const MAX_ERROR_BODY_CHARS: usize = 1000;

/// Successful delivery of one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkReceipt {
    pub status: u16,
}

/// Destination for validated readings
///
/// Each call makes exactly one delivery attempt. Retrying is up to the caller.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn send(&self, reading: &WeatherReading) -> Result<SinkReceipt, DeliveryError>;
}

/// Sink that POSTs readings as JSON to an ingestion endpoint
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    url: String,
}

impl HttpSink {
    /// Create a sink with its own HTTP client using the given request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reading-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(client, url))
    }

    /// Create a sink around an existing client (timeouts are the client's)
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReadingSink for HttpSink {
    async fn send(&self, reading: &WeatherReading) -> Result<SinkReceipt, DeliveryError> {
        let body = reading.to_wire()?;
        let start = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Transport(format!("request to {} timed out: {}", self.url, e))
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        metrics::histogram!("relay.sink.request_duration_ms")
            .record(start.elapsed().as_millis() as f64);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        debug!(
            "Sink accepted reading {} (status {})",
            reading.timestamp, status
        );
        Ok(SinkReceipt {
            status: status.as_u16(),
        })
    }
}
