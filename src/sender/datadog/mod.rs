//! Datadog Series API Client
//!
//! Submits gauges to `POST /api/v1/series` with the `DD-API-KEY` header.
//! The API answers `202 Accepted` on success; any other status is reported as
//! [`DispatchError::NonSuccessResponse`].
//!
//! # Modes
//! - `debug`: log the full payload before sending
//! - `dry_run`: log and return without touching the network

use reqwest::StatusCode;

use crate::context::RunContext;
use crate::error::{DispatchError, GaugeError, Result};
use crate::sender::{MetricSender, SeriesPayload};

/// Default series endpoint
pub const DATADOG_API_URL: &str = "https://api.datadoghq.com/api/v1/series";

const API_KEY_HEADER: &str = "DD-API-KEY";

/// Longest response body kept in a `NonSuccessResponse`
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for the Datadog series endpoint
///
/// One instance (and one connection pool) is shared by a whole run.
#[derive(Debug, Clone)]
pub struct DatadogClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    debug: bool,
    dry_run: bool,
}

impl DatadogClient {
    /// Create a client for the default endpoint
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sqlgauge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GaugeError::config_error(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: DATADOG_API_URL.to_string(),
            debug: false,
            dry_run: false,
        })
    }

    /// Override the series endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl MetricSender for DatadogClient {
    async fn send(
        &self,
        ctx: &RunContext,
        name: &str,
        value: f64,
        tags: &[String],
        host: &str,
    ) -> std::result::Result<(), DispatchError> {
        let timestamp = chrono::Utc::now().timestamp();
        let payload = SeriesPayload::gauge(name, value, tags, host, timestamp);

        if self.debug {
            tracing::debug!(
                metric = name,
                value,
                ?tags,
                host,
                url = %self.endpoint,
                payload = %serde_json::to_string(&payload).unwrap_or_default(),
                "Sending metric to Datadog"
            );
        }

        if self.dry_run {
            tracing::info!(
                metric = name,
                value,
                ?tags,
                host,
                "Dry run mode - skipping actual metric submission"
            );
            return Ok(());
        }

        let request = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload);

        let response = ctx
            .run(request.send())
            .await
            .map_err(|interrupted| {
                tracing::warn!(
                    metric = name,
                    reason = ?interrupted,
                    "Datadog request cancelled or timed out"
                );
                DispatchError::from(interrupted)
            })?
            .map_err(|e| DispatchError::TransportFailure(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = match ctx.run(response.text()).await {
                Ok(Ok(body)) => body.chars().take(MAX_ERROR_BODY).collect(),
                _ => String::new(),
            };
            return Err(DispatchError::NonSuccessResponse {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            metric = name,
            status = status.as_u16(),
            "Metric sent successfully"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let client = DatadogClient::new("key").unwrap();
        assert_eq!(client.endpoint, DATADOG_API_URL);
        assert!(!client.debug);
        assert!(!client.dry_run);

        let client = client
            .with_endpoint("http://127.0.0.1:9/series")
            .with_dry_run(true);
        assert_eq!(client.endpoint, "http://127.0.0.1:9/series");
        assert!(client.dry_run);
    }

    #[tokio::test]
    async fn test_dry_run_skips_network() {
        // Nothing listens on the discard port; a real request would fail
        let client = DatadogClient::new("key")
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/api/v1/series")
            .with_dry_run(true);

        let result = client.send(&RunContext::new(), "db.users", 1.0, &[], "").await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let client = DatadogClient::new("key")
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/");
        let ctx = RunContext::new();
        ctx.cancel();

        let result = client.send(&ctx, "db.users", 1.0, &[], "").await;
        assert_eq!(result, Err(DispatchError::Cancelled));
    }
}
