//! sqlgauge CLI Entry Point
//!
//! One invocation is one collection pass:
//! settings → metrics file → database connect + ping → collect → envelope.
//!
//! All output to stdout is JSON-only. Logs go to stderr. Fatal errors
//! (configuration, connection string, initial connect) print an error
//! envelope and exit with status 1; per-metric failures do not change the
//! exit status.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::Serialize;

use sqlgauge::config::{load_metrics, Settings, DEFAULT_CONFIG_PATH};
use sqlgauge::guard::connection::redact_connection_string;
use sqlgauge::output::COLLECT_COMMAND;
use sqlgauge::{
    BuildInfo, CollectionPipeline, DatabaseType, DatadogClient, ErrorEnvelope, Metadata,
    PipelineOptions, PostgresSource, Result, RunContext, RunSummary, SuccessEnvelope,
};

/// Bound on the startup connect + ping
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// sqlgauge - run scalar SQL queries and ship the results to Datadog
#[derive(Parser, Debug)]
#[command(name = "sqlgauge")]
#[command(about = "Run read-only scalar SQL queries and ship the results to Datadog as gauges")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Path to the metrics file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging, including outgoing payloads
    #[arg(long)]
    debug: bool,

    /// Validate and query, but do not submit metrics
    #[arg(long)]
    dry_run: bool,

    /// Deadline for each query and each submission ("30s", "500ms"; 0 disables)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    timeout: Duration,

    /// Print version information as JSON and exit
    #[arg(long)]
    version: bool,
}

impl Cli {
    fn pipeline_options(&self) -> PipelineOptions {
        let op_timeout = if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        };
        PipelineOptions { op_timeout }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        print_json(&BuildInfo::current());
        return ExitCode::SUCCESS;
    }

    sqlgauge::logging::init(cli.debug);

    let ctx = RunContext::new();
    spawn_signal_handler(ctx.clone());

    let started = Instant::now();
    let engine = DatabaseType::Postgres.as_str();

    match run(&cli, &ctx).await {
        Ok(summary) => {
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let meta = Metadata::new(elapsed);
            print_json(&SuccessEnvelope::new(engine, COLLECT_COMMAND, summary, meta));
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "Run aborted");
            print_json(&ErrorEnvelope::from_error(engine, COLLECT_COMMAND, &e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, ctx: &RunContext) -> Result<RunSummary> {
    let settings = Settings::from_env(cli.dry_run)?;
    tracing::debug!(?settings, "Settings resolved");

    let metrics = load_metrics(&cli.config)?;
    tracing::info!(
        path = %cli.config.display(),
        metrics = metrics.len(),
        "Configuration loaded"
    );

    let sender = DatadogClient::new(settings.api_key.clone().unwrap_or_default())?
        .with_endpoint(settings.api_url.clone())
        .with_debug(cli.debug)
        .with_dry_run(cli.dry_run);

    let connect_ctx = ctx.child(Some(CONNECT_TIMEOUT));
    let source = PostgresSource::connect(&connect_ctx, &settings.database_url).await?;
    source.ping(&connect_ctx).await?;
    tracing::info!(
        database = %redact_connection_string(&settings.database_url),
        "Connected to database"
    );

    let options = cli.pipeline_options();
    tracing::debug!(op_timeout = ?options.op_timeout, "Starting collection pass");

    let pipeline = CollectionPipeline::new(&source, &sender, options);
    Ok(pipeline.collect(ctx, &metrics).await)
}

/// Cancel `ctx` on SIGINT or SIGTERM
fn spawn_signal_handler(ctx: RunContext) {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Shutdown signal received, cancelling run");
        ctx.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}
