//! Collection Pipeline
//!
//! Runs one collection pass over the configured metrics, strictly in order:
//!
//! 1. A non-empty query goes through [`validate_query`]; a rejected query is
//!    never sent to the database.
//! 2. An accepted query is executed through the [`ScalarSource`] and the
//!    scalar coerced to `f64`.
//! 3. The value is submitted through the [`MetricSender`].
//!
//! A metric with an empty query is submitted with value `0`.
//!
//! # Failure Isolation
//! Every per-metric failure (rejection, execution, dispatch, timeout,
//! cancellation) is logged with the metric name and error code and recorded in
//! the [`RunSummary`]; the pass always continues with the next metric.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::MetricDefinition;
use crate::context::RunContext;
use crate::engine::ScalarSource;
use crate::error::{DispatchError, ExecutionError};
use crate::guard::validate_query;
use crate::output::ErrorInfo;
use crate::sender::MetricSender;

/// Default per-operation timeout
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs for one collection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Deadline applied to each query and to each submission; `None` disables
    pub op_timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            op_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
        }
    }
}

/// What happened to one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Sent,
    Rejected,
    ExecutionFailed,
    DispatchFailed,
}

/// Per-metric result of a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOutcome {
    pub name: String,

    pub status: OutcomeStatus,

    /// Value sent, or that failed to send
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl MetricOutcome {
    fn sent(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            status: OutcomeStatus::Sent,
            value: Some(value),
            error: None,
        }
    }

    fn failed(name: &str, status: OutcomeStatus, value: Option<f64>, error: ErrorInfo) -> Self {
        Self {
            name: name.to_string(),
            status,
            value,
            error: Some(error),
        }
    }
}

/// Counts and outcomes of one collection pass, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub metrics_total: usize,
    pub sent: usize,
    pub rejected: usize,
    pub execution_failed: usize,
    pub dispatch_failed: usize,
    pub outcomes: Vec<MetricOutcome>,
}

impl RunSummary {
    fn record(&mut self, outcome: MetricOutcome) {
        self.metrics_total += 1;
        match outcome.status {
            OutcomeStatus::Sent => self.sent += 1,
            OutcomeStatus::Rejected => self.rejected += 1,
            OutcomeStatus::ExecutionFailed => self.execution_failed += 1,
            OutcomeStatus::DispatchFailed => self.dispatch_failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Number of metrics that were not delivered
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.rejected + self.execution_failed + self.dispatch_failed
    }
}

/// Validate, execute and dispatch configured metrics
pub struct CollectionPipeline<'a, S, M> {
    source: &'a S,
    sender: &'a M,
    options: PipelineOptions,
}

impl<'a, S, M> CollectionPipeline<'a, S, M>
where
    S: ScalarSource,
    M: MetricSender,
{
    pub const fn new(source: &'a S, sender: &'a M, options: PipelineOptions) -> Self {
        Self {
            source,
            sender,
            options,
        }
    }

    /// Run one pass over `metrics` under the root context `ctx`
    pub async fn collect(&self, ctx: &RunContext, metrics: &[MetricDefinition]) -> RunSummary {
        let mut summary = RunSummary::default();

        for metric in metrics {
            let outcome = self.collect_one(ctx, metric).await;
            summary.record(outcome);
        }

        tracing::info!(
            metrics_total = summary.metrics_total,
            sent = summary.sent,
            rejected = summary.rejected,
            execution_failed = summary.execution_failed,
            dispatch_failed = summary.dispatch_failed,
            failed = summary.failed(),
            "Collection pass finished"
        );

        summary
    }

    async fn collect_one(&self, ctx: &RunContext, metric: &MetricDefinition) -> MetricOutcome {
        let name = metric.name.as_str();

        let value = if metric.query.is_empty() {
            0.0
        } else {
            if let Err(e) = validate_query(&metric.query) {
                tracing::error!(
                    metric = name,
                    code = e.error_code(),
                    error = %e,
                    "Invalid query in config"
                );
                return MetricOutcome::failed(
                    name,
                    OutcomeStatus::Rejected,
                    None,
                    ErrorInfo::new(e.error_code(), e.to_string()),
                );
            }

            match self.fetch(ctx, &metric.query).await {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!(
                        metric = name,
                        code = e.error_code(),
                        error = %e,
                        "Error fetching metric from DB"
                    );
                    return MetricOutcome::failed(
                        name,
                        OutcomeStatus::ExecutionFailed,
                        None,
                        ErrorInfo::new(e.error_code(), e.to_string()),
                    );
                }
            }
        };

        match self.dispatch(ctx, metric, value).await {
            Ok(()) => MetricOutcome::sent(name, value),
            Err(e) => {
                tracing::error!(
                    metric = name,
                    code = e.error_code(),
                    error = %e,
                    "Failed to send metric"
                );
                MetricOutcome::failed(
                    name,
                    OutcomeStatus::DispatchFailed,
                    Some(value),
                    ErrorInfo::new(e.error_code(), e.to_string()),
                )
            }
        }
    }

    async fn fetch(&self, ctx: &RunContext, query: &str) -> Result<f64, ExecutionError> {
        tracing::debug!(query, "Executing SQL query");

        let op_ctx = ctx.child(self.options.op_timeout);
        let scalar = self.source.execute_scalar(&op_ctx, query).await?;
        let value = scalar.to_f64()?;

        tracing::debug!(query, value, "SQL query result");
        Ok(value)
    }

    async fn dispatch(
        &self,
        ctx: &RunContext,
        metric: &MetricDefinition,
        value: f64,
    ) -> Result<(), DispatchError> {
        let op_ctx = ctx.child(self.options.op_timeout);
        self.sender
            .send(&op_ctx, &metric.name, value, &metric.tags, &metric.host)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Scalar;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers from a fixed table; queries mentioning `pg_sleep` never finish
    #[derive(Default)]
    struct TableSource {
        answers: HashMap<String, Result<Scalar, ExecutionError>>,
        executed: Mutex<Vec<String>>,
    }

    impl TableSource {
        fn with(mut self, query: &str, answer: Result<Scalar, ExecutionError>) -> Self {
            self.answers.insert(query.to_string(), answer);
            self
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    impl ScalarSource for TableSource {
        async fn execute_scalar(
            &self,
            ctx: &RunContext,
            query: &str,
        ) -> Result<Scalar, ExecutionError> {
            self.executed.lock().unwrap().push(query.to_string());

            if query.contains("pg_sleep") {
                ctx.run(std::future::pending::<()>()).await?;
            }

            let missing = ExecutionError::DriverFailure("relation does not exist".into());
            self.answers.get(query).cloned().unwrap_or(Err(missing))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Sent {
        name: String,
        value: f64,
        tags: Vec<String>,
        host: String,
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<Sent>>,
        reject: Vec<String>,
    }

    impl RecordingSender {
        fn rejecting(name: &str) -> Self {
            Self {
                reject: vec![name.to_string()],
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MetricSender for RecordingSender {
        async fn send(
            &self,
            _ctx: &RunContext,
            name: &str,
            value: f64,
            tags: &[String],
            host: &str,
        ) -> Result<(), DispatchError> {
            if self.reject.iter().any(|r| r == name) {
                return Err(DispatchError::NonSuccessResponse {
                    status: 403,
                    body: "Forbidden".into(),
                });
            }
            self.sent.lock().unwrap().push(Sent {
                name: name.to_string(),
                value,
                tags: tags.to_vec(),
                host: host.to_string(),
            });
            Ok(())
        }
    }

    fn metric(name: &str, query: &str) -> MetricDefinition {
        MetricDefinition {
            name: name.to_string(),
            tags: vec!["env:test".to_string()],
            host: "db-01".to_string(),
            query: query.to_string(),
        }
    }

    #[tokio::test]
    async fn test_accepted_query_is_sent() {
        let source =
            TableSource::default().with("SELECT count(*) FROM users", Ok(Scalar::Int(42)));
        let sender = RecordingSender::default();
        let pipeline = CollectionPipeline::new(&source, &sender, PipelineOptions::default());

        let metrics = [metric("db.users", "SELECT count(*) FROM users")];
        let summary = pipeline.collect(&RunContext::new(), &metrics).await;

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed(), 0);
        assert_eq!(
            sender.sent(),
            vec![Sent {
                name: "db.users".into(),
                value: 42.0,
                tags: vec!["env:test".into()],
                host: "db-01".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_rejected_query_is_never_executed() {
        let source = TableSource::default();
        let sender = RecordingSender::default();
        let pipeline = CollectionPipeline::new(&source, &sender, PipelineOptions::default());

        let summary = pipeline
            .collect(
                &RunContext::new(),
                &[
                    metric("db.drop", "SELECT age FROM users; DROP TABLE users;"),
                    metric("db.update", "UPDATE users SET age = 30"),
                    metric("db.multi", "SELECT age, name FROM users"),
                ],
            )
            .await;

        assert!(source.executed().is_empty());
        assert!(sender.sent().is_empty());
        assert_eq!(summary.rejected, 3);

        let codes: Vec<&str> = summary
            .outcomes
            .iter()
            .map(|o| o.error.as_ref().map_or("", |e| e.code.as_str()))
            .collect();
        assert_eq!(
            codes,
            vec!["FORBIDDEN_COMMAND", "NOT_A_SELECT", "MULTIPLE_COLUMNS"]
        );
    }

    #[tokio::test]
    async fn test_empty_query_sends_zero() {
        let source = TableSource::default();
        let sender = RecordingSender::default();
        let pipeline = CollectionPipeline::new(&source, &sender, PipelineOptions::default());

        let metrics = [metric("db.heartbeat", "")];
        let summary = pipeline.collect(&RunContext::new(), &metrics).await;

        assert!(source.executed().is_empty());
        assert_eq!(
            summary.outcomes,
            vec![MetricOutcome::sent("db.heartbeat", 0.0)]
        );
        assert_eq!(sender.sent()[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_metrics() {
        let source = TableSource::default()
            .with("SELECT 1 FROM ok", Ok(Scalar::Int(1)))
            .with("SELECT name FROM users", Ok(Scalar::Text("alice".into())))
            .with("SELECT 2 FROM ok", Ok(Scalar::Float(2.5)))
            .with("SELECT 3 FROM ok", Ok(Scalar::Int(3)));
        let sender = RecordingSender::rejecting("m.forbidden");
        let pipeline = CollectionPipeline::new(&source, &sender, PipelineOptions::default());

        let summary = pipeline
            .collect(
                &RunContext::new(),
                &[
                    metric("m.first", "SELECT 1 FROM ok"),
                    metric("m.missing", "SELECT x FROM missing"),
                    metric("m.text", "SELECT name FROM users"),
                    metric("m.forbidden", "SELECT 2 FROM ok"),
                    metric("m.last", "SELECT 3 FROM ok"),
                ],
            )
            .await;

        let statuses: Vec<OutcomeStatus> = summary.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                OutcomeStatus::Sent,
                OutcomeStatus::ExecutionFailed,
                OutcomeStatus::ExecutionFailed,
                OutcomeStatus::DispatchFailed,
                OutcomeStatus::Sent,
            ]
        );
        assert_eq!(summary.metrics_total, 5);
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.execution_failed, 2);
        assert_eq!(summary.dispatch_failed, 1);

        let forbidden = &summary.outcomes[3];
        assert_eq!(forbidden.value, Some(2.5));
        assert_eq!(
            forbidden.error.as_ref().map(|e| e.code.as_str()),
            Some("NON_SUCCESS_RESPONSE")
        );

        let names: Vec<String> = sender.sent().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["m.first", "m.last"]);
    }

    #[tokio::test]
    async fn test_query_timeout_is_isolated() {
        let source = TableSource::default().with("SELECT 1 FROM ok", Ok(Scalar::Int(1)));
        let sender = RecordingSender::default();
        let options = PipelineOptions {
            op_timeout: Some(Duration::from_millis(20)),
        };
        let pipeline = CollectionPipeline::new(&source, &sender, options);

        let metrics = [
            metric("m.slow", "SELECT pg_sleep(60) FROM ok"),
            metric("m.fast", "SELECT 1 FROM ok"),
        ];
        let summary = pipeline.collect(&RunContext::new(), &metrics).await;

        let slow = &summary.outcomes[0];
        assert_eq!(slow.status, OutcomeStatus::ExecutionFailed);
        assert_eq!(
            slow.error.as_ref().map(|e| e.code.as_str()),
            Some("QUERY_TIMEOUT")
        );
        assert_eq!(summary.outcomes[1].status, OutcomeStatus::Sent);
    }

    #[tokio::test]
    async fn test_cancelled_run_records_cancellation() {
        let source = TableSource::default();
        let sender = RecordingSender::default();
        let options = PipelineOptions { op_timeout: None };
        let pipeline = CollectionPipeline::new(&source, &sender, options);

        let ctx = RunContext::new();
        ctx.cancel();

        let metrics = [metric("m.slow", "SELECT pg_sleep(60) FROM ok")];
        let summary = pipeline.collect(&ctx, &metrics).await;

        assert_eq!(
            summary.outcomes[0].error.as_ref().map(|e| e.code.as_str()),
            Some("QUERY_CANCELLED")
        );
    }

    #[test]
    fn test_summary_serialization() {
        let mut summary = RunSummary::default();
        summary.record(MetricOutcome::sent("a", 1.0));
        summary.record(MetricOutcome::failed(
            "b",
            OutcomeStatus::Rejected,
            None,
            ErrorInfo::new("NOT_A_SELECT", "invalid query: only SELECT statements are allowed"),
        ));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["metrics_total"], 2);
        assert_eq!(json["outcomes"][0]["status"], "sent");
        assert_eq!(json["outcomes"][0]["value"], 1.0);
        assert!(json["outcomes"][0].get("error").is_none());
        assert_eq!(json["outcomes"][1]["status"], "rejected");
        assert!(json["outcomes"][1].get("value").is_none());
        assert_eq!(json["outcomes"][1]["error"]["code"], "NOT_A_SELECT");
    }
}
