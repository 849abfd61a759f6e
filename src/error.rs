//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout sqlgauge.
//! Every error maps to a stable error code for JSON output and log fields.
//!
//! # Error Families
//! - [`ConnectionError`]: the database URL failed structural validation (fatal)
//! - [`QueryError`]: a configured query failed the read-only guard (per metric)
//! - [`ExecutionError`]: the database produced no usable scalar (per metric)
//! - [`DispatchError`]: the metric could not be delivered (per metric)
//! - [`GaugeError`]: fatal failures that abort the run

use thiserror::Error;

use crate::context::Interrupted;

/// Database connection string rejected by the URL validator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The text could not be parsed as a hierarchical URI
    #[error("invalid database URL: {0}")]
    Malformed(String),

    /// Scheme other than `postgres` / `postgresql`
    #[error("invalid database URL: scheme must be 'postgres' or 'postgresql', got '{0}'")]
    UnsupportedScheme(String),

    /// Authority has no host
    #[error("invalid database URL: host is empty")]
    MissingHost,

    /// Path does not name a database
    #[error("invalid database URL: database name is missing")]
    MissingDatabaseName,
}

impl ConnectionError {
    /// Stable error code for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED_URL",
            Self::UnsupportedScheme(_) => "UNSUPPORTED_SCHEME",
            Self::MissingHost => "MISSING_HOST",
            Self::MissingDatabaseName => "MISSING_DATABASE_NAME",
        }
    }
}

/// Query rejected by the read-only guard
///
/// Variants are ordered the way the guard evaluates them; the first failing
/// check is the one reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Query does not start with `SELECT`
    #[error("invalid query: only SELECT statements are allowed")]
    NotASelect,

    /// No whitespace-delimited `FROM` after the `SELECT` keyword
    #[error("invalid query: missing FROM clause")]
    MissingFromClause,

    /// A mutating or schema-altering keyword appears somewhere in the text
    #[error("invalid query: detected a forbidden SQL command '{keyword}'")]
    ForbiddenCommand { keyword: String },

    /// The select list could not be isolated
    #[error("invalid query: unable to parse selected columns in '{query}'")]
    UnparsableColumnList { query: String },

    /// More than one top-level column is selected
    #[error("invalid query: multiple columns are not allowed ('{columns}')")]
    MultipleColumns { columns: String },
}

impl QueryError {
    /// Stable error code for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotASelect => "NOT_A_SELECT",
            Self::MissingFromClause => "MISSING_FROM_CLAUSE",
            Self::ForbiddenCommand { .. } => "FORBIDDEN_COMMAND",
            Self::UnparsableColumnList { .. } => "UNPARSABLE_COLUMN_LIST",
            Self::MultipleColumns { .. } => "MULTIPLE_COLUMNS",
        }
    }
}

/// Failure while fetching a scalar from the database
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// Driver or server reported an error
    #[error("failed to execute query: {0}")]
    DriverFailure(String),

    /// The per-operation deadline expired
    #[error("database query timed out")]
    Timeout,

    /// The run was cancelled (SIGINT/SIGTERM)
    #[error("database query cancelled")]
    Cancelled,

    /// The value cannot be converted to a float
    #[error("unexpected data type: {0}")]
    UnexpectedType(String),

    /// The result row does not have exactly one column
    #[error("expected a single column, query returned {columns}")]
    UnexpectedShape { columns: usize },
}

impl ExecutionError {
    /// Stable error code for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::DriverFailure(_) => "DRIVER_FAILURE",
            Self::Timeout => "QUERY_TIMEOUT",
            Self::Cancelled => "QUERY_CANCELLED",
            Self::UnexpectedType(_) => "UNEXPECTED_TYPE",
            Self::UnexpectedShape { .. } => "UNEXPECTED_SHAPE",
        }
    }
}

impl From<Interrupted> for ExecutionError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::DeadlineExceeded => Self::Timeout,
            Interrupted::Cancelled => Self::Cancelled,
        }
    }
}

/// Failure while sending a metric to the monitoring API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The request never produced a response
    #[error("failed to send request: {0}")]
    TransportFailure(String),

    /// The API answered with something other than `202 Accepted`
    #[error("unexpected response code: {status}")]
    NonSuccessResponse { status: u16, body: String },

    /// The per-operation deadline expired
    #[error("metric submission timed out")]
    Timeout,

    /// The run was cancelled (SIGINT/SIGTERM)
    #[error("metric submission cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Stable error code for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::TransportFailure(_) => "TRANSPORT_FAILURE",
            Self::NonSuccessResponse { .. } => "NON_SUCCESS_RESPONSE",
            Self::Timeout => "DISPATCH_TIMEOUT",
            Self::Cancelled => "DISPATCH_CANCELLED",
        }
    }
}

impl From<Interrupted> for DispatchError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::DeadlineExceeded => Self::Timeout,
            Interrupted::Cancelled => Self::Cancelled,
        }
    }
}

/// Process-level error type
///
/// Anything that surfaces as a `GaugeError` from `main` aborts the run before
/// (or instead of) metric collection.
#[derive(Error, Debug)]
pub enum GaugeError {
    /// `DATABASE_URL` failed validation
    #[error(transparent)]
    InvalidConnectionString(#[from] ConnectionError),

    /// Configuration file or environment problem
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Could not reach the database at startup
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl GaugeError {
    /// Convert error to error code string for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConnectionString(e) => e.error_code(),
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
        }
    }

    /// Human-readable error message
    ///
    /// Connection errors never include the connection string itself, so the
    /// message is safe to print.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }
}

/// Result type alias for process-level operations
pub type Result<T> = std::result::Result<T, GaugeError>;
