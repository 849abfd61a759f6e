//! Database Engine Traits and Core Types
//!
//! This module defines the seam between the collection pipeline and the
//! database driver. The pipeline only ever asks for one scalar per query.
//!
//! # Engine Isolation
//! The `PostgreSQL` implementation lives behind the `postgres` feature.
//! Tests drive the pipeline with in-memory implementations of [`ScalarSource`].

use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::ExecutionError;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Supported database engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single value read from a one-row, one-column result
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Any integer column
    Int(i64),
    /// Floating point or decoded numeric column
    Float(f64),
    /// Textual column, parsed on coercion
    Text(String),
    /// Binary column, parsed as UTF-8 text on coercion
    Bytes(Vec<u8>),
}

impl Scalar {
    /// Coerce to the gauge value sent to the metrics API
    ///
    /// Non-finite results are rejected: the series endpoint cannot encode them.
    pub fn to_f64(&self) -> Result<f64, ExecutionError> {
        let value = match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
            Self::Text(s) => parse_float(s)?,
            Self::Bytes(b) => {
                let s = std::str::from_utf8(b).map_err(|_| {
                    ExecutionError::UnexpectedType(
                        "could not convert byte slice to float64: invalid UTF-8".into(),
                    )
                })?;
                parse_float(s)?
            }
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExecutionError::UnexpectedType(format!("non-finite value {value}")))
        }
    }
}

fn parse_float(s: &str) -> Result<f64, ExecutionError> {
    s.trim().parse::<f64>().map_err(|e| {
        ExecutionError::UnexpectedType(format!("could not convert '{s}' to float64: {e}"))
    })
}

/// Source of scalar query results
///
/// Implementations must honour `ctx`: when it expires or is cancelled the
/// call returns `ExecutionError::Timeout` / `ExecutionError::Cancelled`
/// instead of waiting on the database.
pub trait ScalarSource {
    /// Run `query` and return the first column of its first row
    fn execute_scalar(
        &self,
        ctx: &RunContext,
        query: &str,
    ) -> impl std::future::Future<Output = Result<Scalar, ExecutionError>> + Send;
}
