//! JSON Output Envelope Types
//!
//! stdout carries exactly one JSON envelope per run; logs go to stderr.
//!
//! # Output Contract
//! - Success: `{"ok": true, "engine", "command", "data", "meta"}`
//! - Error: `{"ok": false, "engine", "command", "error": {"code", "message"}}`
//!
//! Error codes are the stable `error_code()` strings of [`crate::error`].

use serde::{Deserialize, Serialize};

use crate::error::GaugeError;

/// Command name reported for a collection pass
pub const COLLECT_COMMAND: &str = "collect";

/// Success envelope for a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Database engine the metrics were read from
    pub engine: String,

    /// Command that was executed
    pub command: String,

    /// Command-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(
        engine: impl Into<String>,
        command: impl Into<String>,
        data: T,
        meta: Metadata,
    ) -> Self {
        Self {
            ok: true,
            engine: engine.into(),
            command: command.into(),
            data,
            meta,
        }
    }
}

/// Error envelope for a run that could not start or complete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    pub engine: String,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(engine: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            engine: engine.into(),
            command: command.into(),
            error,
        }
    }

    /// Create error envelope from a fatal [`GaugeError`]
    pub fn from_error(
        engine: impl Into<String>,
        command: impl Into<String>,
        err: &GaugeError,
    ) -> Self {
        let info = ErrorInfo::new(err.error_code(), err.message());
        Self::new(engine, command, info)
    }
}

/// Error code plus message
///
/// Also used for per-metric failures inside a run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g. "FORBIDDEN_COMMAND", "QUERY_TIMEOUT")
    pub code: String,

    /// Human-readable message, never containing credentials
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Execution metadata included in success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Wall-clock duration of the run in milliseconds
    pub execution_ms: u64,
}

impl Metadata {
    #[must_use]
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms }
    }
}
