//! Structured logging setup
//!
//! Events are written as JSON lines to stderr so stdout stays reserved for
//! the output envelope. `RUST_LOG` overrides the default level.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
#[must_use]
pub const fn default_filter(debug_mode: bool) -> &'static str {
    if debug_mode {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber; later calls are no-ops
pub fn init(debug_mode: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug_mode)));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_current_span(false)
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!(debug_mode, "tracing initialized");
}
