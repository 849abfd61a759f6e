//! sqlgauge - SQL Query Metrics Exporter
//!
//! sqlgauge runs a configured list of scalar SQL queries against a `PostgreSQL`
//! database and submits each result to Datadog as a gauge.
//!
//! # Core Principles
//! - Every configured query passes a lexical read-only guard before it reaches the database
//! - One bad metric never aborts the batch
//! - JSON-only stdout (one envelope per run), structured JSON logs on stderr
//! - Every database call and every submission is bounded by a deadline and cancellable
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`context`] - Cancellation and deadlines
//! - [`guard`] - Query guard and connection string validation
//! - [`engine`] - Scalar source trait and the `PostgreSQL` implementation
//! - [`sender`] - Metric sender trait and the Datadog client
//! - [`config`] - Metrics file and environment settings
//! - [`pipeline`] - Collection pass
//! - [`output`] - JSON output envelope types
//! - [`logging`] - Tracing subscriber setup
//! - [`version`] - Build information

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod guard;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod sender;
pub mod version;

pub use config::{load_metrics, MetricDefinition, Settings};
pub use context::{Interrupted, RunContext};
pub use engine::{DatabaseType, Scalar, ScalarSource};
pub use error::{ConnectionError, DispatchError, ExecutionError, GaugeError, QueryError, Result};
pub use guard::connection::{validate_connection_string, ConnectionDescriptor};
pub use guard::validate_query;
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use pipeline::{CollectionPipeline, MetricOutcome, OutcomeStatus, PipelineOptions, RunSummary};
pub use sender::datadog::DatadogClient;
pub use sender::MetricSender;
pub use version::BuildInfo;

#[cfg(feature = "postgres")]
pub use engine::postgres::PostgresSource;
