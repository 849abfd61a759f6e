//! `PostgreSQL` Scalar Source
//!
//! Implements [`ScalarSource`] on top of `tokio-postgres`.
//!
//! # Implementation Notes
//! - One client per run, shared by every metric
//! - Queries go through the extended protocol, so the server itself refuses
//!   anything containing more than one statement
//! - Timeouts and cancellation come from the caller's [`RunContext`]; an
//!   interrupted query is also cancelled server-side
//! - `NUMERIC` is decoded from its binary wire format straight to `f64`
//! - `NoTls` only, like every other connection this tool opens to the database

use std::error::Error as StdError;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};

use crate::context::{Interrupted, RunContext};
use crate::engine::{Scalar, ScalarSource};
use crate::error::{ExecutionError, GaugeError, Result};
use crate::guard::connection::{parse_connection_string, ConnectionDescriptor};

/// Upper bound for the out-of-band cancel request
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// `PostgreSQL` scalar source holding one open client
pub struct PostgresSource {
    client: Client,
}

impl PostgresSource {
    /// Validate `database_url` and open a connection within `ctx`
    pub async fn connect(ctx: &RunContext, database_url: &str) -> Result<Self> {
        let (pg_config, descriptor) = build_pg_config(database_url)?;
        tracing::debug!(
            host = %descriptor.host,
            database = descriptor.database(),
            "Connecting to PostgreSQL"
        );

        let (client, connection) = ctx
            .run(pg_config.connect(NoTls))
            .await
            .map_err(|i| interrupted_connect("connect to PostgreSQL", i))?
            .map_err(|e| {
                GaugeError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
            })?;

        // Note: Connection errors are not logged to prevent credential leakage
        tokio::spawn(async move {
            let _ = connection.await;
        });

        Ok(Self { client })
    }

    /// Round-trip a trivial statement to prove the connection works
    pub async fn ping(&self, ctx: &RunContext) -> Result<()> {
        ctx.run(self.client.simple_query("SELECT 1"))
            .await
            .map_err(|i| interrupted_connect("ping PostgreSQL", i))?
            .map_err(|e| GaugeError::connection_failed(format!("Failed to connect to DB: {e}")))?;
        Ok(())
    }

    async fn cancel_running_query(&self) {
        let token = self.client.cancel_token();
        match tokio::time::timeout(CANCEL_TIMEOUT, token.cancel_query(NoTls)).await {
            Ok(Ok(())) => tracing::debug!("Cancelled running query on the server"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to cancel running query"),
            Err(_) => tracing::warn!("Timed out cancelling running query"),
        }
    }
}

impl ScalarSource for PostgresSource {
    async fn execute_scalar(
        &self,
        ctx: &RunContext,
        query: &str,
    ) -> std::result::Result<Scalar, ExecutionError> {
        let start = Instant::now();

        let result = run_query(ctx, fetch_scalar(&self.client, query), || {
            self.cancel_running_query()
        })
        .await;

        let query_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => tracing::info!(query, query_time_ms, "Query execution completed"),
            Err(e) => tracing::error!(
                query,
                query_time_ms,
                error_code = e.error_code(),
                error = %e,
                "Query execution failed"
            ),
        }

        result
    }
}

/// Drive `query` under `ctx`
///
/// `cancel` runs only when an interrupted query had already been sent. A
/// context that was done beforehand never reaches the server.
async fn run_query<Q, C, CF>(
    ctx: &RunContext,
    query: Q,
    cancel: C,
) -> std::result::Result<Scalar, ExecutionError>
where
    Q: Future<Output = std::result::Result<Scalar, ExecutionError>>,
    C: FnOnce() -> CF,
    CF: Future<Output = ()>,
{
    match ctx.run_tracked(query).await {
        Ok(result) => result,
        Err(stopped) => {
            if stopped.started {
                cancel().await;
            }
            Err(stopped.reason.into())
        }
    }
}

/// Build `PostgreSQL` connection config from a database URL
///
/// The URL must pass [`parse_connection_string`]. The scheme is normalised
/// to lowercase because the driver only recognises lowercase prefixes.
fn build_pg_config(database_url: &str) -> Result<(Config, ConnectionDescriptor)> {
    let descriptor = parse_connection_string(database_url)?;
    let rest = database_url.split_once(':').map_or("", |(_, rest)| rest);
    let normalized = format!("{}:{}", descriptor.scheme, rest.trim_end());

    let config = normalized.parse::<Config>().map_err(|e| {
        GaugeError::config_error(format!("Invalid PostgreSQL connection string: {e}"))
    })?;
    Ok((config, descriptor))
}

fn interrupted_connect(action: &str, interrupted: Interrupted) -> GaugeError {
    match interrupted {
        Interrupted::DeadlineExceeded => {
            GaugeError::connection_failed(format!("Timed out trying to {action}"))
        }
        Interrupted::Cancelled => {
            GaugeError::connection_failed(format!("Cancelled while trying to {action}"))
        }
    }
}

/// Execute query and return the first column of the first row
async fn fetch_scalar(
    client: &Client,
    query: &str,
) -> std::result::Result<Scalar, ExecutionError> {
    let rows = client
        .query(query, &[])
        .await
        .map_err(|e| driver_failure(&e))?;

    let row = rows
        .first()
        .ok_or_else(|| ExecutionError::DriverFailure("query returned no rows".into()))?;

    let columns = row.columns().len();
    if columns != 1 {
        return Err(ExecutionError::UnexpectedShape { columns });
    }

    scalar_from_row(row, 0)
}

fn driver_failure(e: &tokio_postgres::Error) -> ExecutionError {
    let detail = match e.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => e.to_string(),
    };
    ExecutionError::DriverFailure(detail)
}

/// Convert a `PostgreSQL` column value to a [`Scalar`]
fn scalar_from_row(row: &Row, idx: usize) -> std::result::Result<Scalar, ExecutionError> {
    let col_type = row.columns()[idx].type_();

    let scalar = match *col_type {
        // Integers
        Type::INT2 => Scalar::Int(i64::from(non_null::<i16>(row, idx)?)),
        Type::INT4 => Scalar::Int(i64::from(non_null::<i32>(row, idx)?)),
        Type::INT8 => Scalar::Int(non_null::<i64>(row, idx)?),
        Type::OID => Scalar::Int(i64::from(non_null::<u32>(row, idx)?)),

        // Floats
        Type::FLOAT4 => Scalar::Float(f64::from(non_null::<f32>(row, idx)?)),
        Type::FLOAT8 => Scalar::Float(non_null::<f64>(row, idx)?),
        Type::NUMERIC => Scalar::Float(non_null::<PgNumeric>(row, idx)?.0),

        // Text types (VARCHAR, TEXT, CHAR, etc.)
        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => {
            Scalar::Text(non_null::<String>(row, idx)?)
        }

        Type::BYTEA => Scalar::Bytes(non_null::<Vec<u8>>(row, idx)?),

        _ => return Err(ExecutionError::UnexpectedType(col_type.name().to_string())),
    };

    Ok(scalar)
}

fn non_null<'a, T>(row: &'a Row, idx: usize) -> std::result::Result<T, ExecutionError>
where
    T: FromSql<'a>,
{
    let value: Option<T> = row.try_get(idx).map_err(|e| {
        ExecutionError::DriverFailure(format!("Failed to read column value: {e}"))
    })?;
    value.ok_or_else(|| ExecutionError::UnexpectedType("NULL".into()))
}

/// `NUMERIC` value decoded to the nearest `f64`
struct PgNumeric(f64);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        decode_numeric(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decode the binary `NUMERIC` format
///
/// Layout: `ndigits: u16, weight: i16, sign: u16, dscale: u16`, then
/// `ndigits` base-10000 digits, most significant first. The first digit is
/// multiplied by `10000^weight`.
fn decode_numeric(raw: &[u8]) -> std::result::Result<f64, Box<dyn StdError + Sync + Send>> {
    let word = |i: usize| u16::from_be_bytes([raw[i], raw[i + 1]]);

    if raw.len() < 8 {
        return Err("numeric value too short".into());
    }

    let ndigits = usize::from(word(0));
    let weight = i32::from(word(2) as i16);
    let sign = word(4);

    if raw.len() != 8 + ndigits * 2 {
        return Err("numeric value has inconsistent length".into());
    }

    let magnitude: f64 = (0..ndigits)
        .map(|i| {
            let exponent = weight - i32::try_from(i).unwrap_or(i32::MAX);
            f64::from(word(8 + i * 2)) * 10_000f64.powi(exponent)
        })
        .sum();

    match sign {
        NUMERIC_POS => Ok(magnitude),
        NUMERIC_NEG => Ok(-magnitude),
        NUMERIC_NAN => Ok(f64::NAN),
        NUMERIC_PINF => Ok(f64::INFINITY),
        NUMERIC_NINF => Ok(f64::NEG_INFINITY),
        other => Err(format!("invalid numeric sign 0x{other:04x}").into()),
    }
}
