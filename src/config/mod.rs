//! Configuration Management
//!
//! Two inputs configure a run:
//! - The metrics file (YAML): the ordered list of [`MetricDefinition`]s
//! - The environment: database URL, Datadog API key and endpoint, resolved
//!   once into [`Settings`]
//!
//! # Metrics file format
//! ```yaml
//! metrics:
//!   - name: "custom.metric.users"
//!     tags: ["env:prod", "team:sre"]
//!     host: "db-01"
//!     query: "SELECT count(*) FROM users"
//! ```
//!
//! `tags`, `host` and `query` are optional. A metric without a query is sent
//! with value `0`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{GaugeError, Result};
use crate::guard::connection::{redact_connection_string, validate_connection_string};
use crate::sender::datadog::DATADOG_API_URL;

/// Default metrics file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Database connection string (required)
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Datadog API key (required unless dry run)
pub const ENV_API_KEY: &str = "DATADOG_API_KEY";

/// Series endpoint override (optional)
pub const ENV_API_URL: &str = "DATADOG_API_URL";

/// One configured metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Metric name, unique within the file
    pub name: String,

    /// Tags attached to the series (`key:value`)
    #[serde(default)]
    pub tags: Vec<String>,

    /// Host reported with the series
    #[serde(default)]
    pub host: String,

    /// Scalar query; empty means "send 0"
    #[serde(default)]
    pub query: String,
}

/// Top-level layout of the metrics file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsFile {
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
}

/// Load and check the metrics file at `path`
pub fn load_metrics(path: &Path) -> Result<Vec<MetricDefinition>> {
    let contents = fs::read_to_string(path).map_err(|e| {
        GaugeError::config_error(format!("failed to read config file {}: {e}", path.display()))
    })?;

    parse_metrics(&contents)
}

/// Parse metrics YAML and check names
///
/// Names must be non-empty and unique. Queries are not validated here; a bad
/// query only skips its own metric at collection time.
pub fn parse_metrics(contents: &str) -> Result<Vec<MetricDefinition>> {
    let file: MetricsFile = serde_yaml::from_str(contents)
        .map_err(|e| GaugeError::config_error(format!("failed to parse YAML: {e}")))?;

    check_names(&file.metrics)?;
    Ok(file.metrics)
}

fn check_names(metrics: &[MetricDefinition]) -> Result<()> {
    let mut seen = HashSet::new();
    for (idx, metric) in metrics.iter().enumerate() {
        if metric.name.trim().is_empty() {
            return Err(GaugeError::config_error(format!("metric #{} has an empty name", idx + 1)));
        }
        if !seen.insert(metric.name.as_str()) {
            return Err(GaugeError::config_error(format!(
                "duplicate metric name '{}'",
                metric.name
            )));
        }
    }
    Ok(())
}

/// Process-wide settings resolved from the environment
#[derive(Clone)]
pub struct Settings {
    /// Validated database URL
    pub database_url: String,

    /// Datadog API key; `None` only in dry-run mode
    pub api_key: Option<String>,

    /// Series endpoint
    pub api_url: String,
}

impl Settings {
    /// Resolve settings from the process environment
    pub fn from_env(dry_run: bool) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), dry_run)
    }

    /// Resolve settings through `lookup`; empty values count as unset
    ///
    /// The database URL is validated here so a malformed URL stops the run
    /// before anything connects.
    pub fn from_lookup<F>(lookup: F, dry_run: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let api_key = get(ENV_API_KEY);
        if api_key.is_none() && !dry_run {
            return Err(GaugeError::config_error(format!("{ENV_API_KEY} is not set")));
        }

        let database_url = get(ENV_DATABASE_URL)
            .ok_or_else(|| GaugeError::config_error(format!("{ENV_DATABASE_URL} is not set")))?;
        validate_connection_string(&database_url)?;

        let api_url = get(ENV_API_URL).unwrap_or_else(|| DATADOG_API_URL.to_string());

        Ok(Self {
            database_url,
            api_key,
            api_url,
        })
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("database_url", &redact_connection_string(&self.database_url))
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_url", &self.api_url)
            .finish()
    }
}
