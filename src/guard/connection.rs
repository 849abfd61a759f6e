//! Connection string validation
//!
//! Accepts only fully specified Postgres URLs:
//! `postgres://[user[:password]@]host[:port]/database[?params]`.
//! Pure and deterministic; nothing here opens a socket.

use url::Url;

use crate::error::ConnectionError;

/// Schemes accepted for the database URL, compared case-insensitively
pub const ACCEPTED_SCHEMES: &[&str] = &["postgres", "postgresql"];

/// Decomposition of a validated connection URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Lowercased scheme
    pub scheme: String,
    /// Host as written (brackets kept for IPv6 literals)
    pub host: String,
    /// Raw path, including the leading `/`
    pub path: String,
}

impl ConnectionDescriptor {
    /// Database name: the path without its leading separator
    #[must_use]
    pub fn database(&self) -> &str {
        self.path.trim_start_matches('/')
    }
}

/// Validate a connection string, discarding the decomposition
pub fn validate_connection_string(url: &str) -> Result<(), ConnectionError> {
    parse_connection_string(url).map(|_| ())
}

/// Parse and validate a connection string
///
/// Checks, in order: URI syntax, scheme, host, database name.
pub fn parse_connection_string(url: &str) -> Result<ConnectionDescriptor, ConnectionError> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(url::ParseError::EmptyHost) => return Err(ConnectionError::MissingHost),
        Err(e) => return Err(ConnectionError::Malformed(e.to_string())),
    };

    // `postgres:foo` parses, but has no authority to speak of
    if parsed.cannot_be_a_base() {
        return Err(ConnectionError::Malformed("missing '//' authority section".into()));
    }

    let scheme = parsed.scheme().to_ascii_lowercase();
    if !ACCEPTED_SCHEMES.contains(&scheme.as_str()) {
        return Err(ConnectionError::UnsupportedScheme(scheme));
    }

    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return Err(ConnectionError::MissingHost),
    };

    let path = parsed.path().to_string();
    if path.trim_start_matches('/').is_empty() {
        return Err(ConnectionError::MissingDatabaseName);
    }

    Ok(ConnectionDescriptor { scheme, host, path })
}

/// Replace the password of a connection URL with `***` for logging
///
/// Unparsable input is not echoed back at all.
#[must_use]
pub fn redact_connection_string(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                // Only fails for cannot-be-a-base URLs, which carry no password
                let _ = parsed.set_password(Some("***"));
            }
            parsed.into()
        }
        Err(_) => "<malformed>".to_string(),
    }
}
