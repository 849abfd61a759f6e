//! Metric Dispatch
//!
//! [`MetricSender`] is the seam between the pipeline and the monitoring API.
//! [`datadog::DatadogClient`] is the production implementation; the series
//! payload types here describe what goes over the wire.

use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::DispatchError;

pub mod datadog;

/// Datadog metric type used for every submitted point
pub const GAUGE: &str = "gauge";

/// Destination for collected metric values
pub trait MetricSender {
    /// Submit one gauge point
    ///
    /// Must return `DispatchError::Timeout` / `DispatchError::Cancelled` when
    /// `ctx` expires or is cancelled rather than waiting on the network.
    fn send(
        &self,
        ctx: &RunContext,
        name: &str,
        value: f64,
        tags: &[String],
        host: &str,
    ) -> impl std::future::Future<Output = Result<(), DispatchError>> + Send;
}

/// Body of a `POST /api/v1/series` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPayload {
    pub series: Vec<Series>,
}

/// One metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Metric name
    pub metric: String,

    /// `[unix_seconds, value]` pairs
    pub points: Vec<(i64, f64)>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub metric_type: String,
}

impl SeriesPayload {
    /// Payload carrying a single gauge point
    #[must_use]
    pub fn gauge(name: &str, value: f64, tags: &[String], host: &str, timestamp: i64) -> Self {
        Self {
            series: vec![Series {
                metric: name.to_string(),
                points: vec![(timestamp, value)],
                tags: tags.to_vec(),
                host: host.to_string(),
                metric_type: GAUGE.to_string(),
            }],
        }
    }
}
