//! Build information reported by `--version`

use serde::{Deserialize, Serialize};

const UNKNOWN: &str = "unknown";

/// Version, revision and build date of this binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    pub revision: String,
    pub build: String,
}

impl BuildInfo {
    /// Info baked in at compile time
    ///
    /// Revision and build date come from `SQLGAUGE_REVISION` and
    /// `SQLGAUGE_BUILD_DATE` in the build environment.
    #[must_use]
    pub fn current() -> Self {
        Self::new(
            env!("CARGO_PKG_VERSION"),
            option_env!("SQLGAUGE_REVISION"),
            option_env!("SQLGAUGE_BUILD_DATE"),
        )
    }

    fn new(version: &str, revision: Option<&str>, build: Option<&str>) -> Self {
        let or_unknown = |v: Option<&str>| {
            v.filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN)
                .to_string()
        };
        Self {
            version: version.to_string(),
            revision: or_unknown(revision),
            build: or_unknown(build),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_version() {
        assert_eq!(BuildInfo::current().version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_missing_values_are_unknown() {
        let info = BuildInfo::new("1.0.0", None, Some(""));
        assert_eq!(info.revision, "unknown");
        assert_eq!(info.build, "unknown");

        let info = BuildInfo::new("1.0.0", Some("abc123"), Some("2024-05-01"));
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(
            json,
            r#"{"version":"1.0.0","revision":"abc123","build":"2024-05-01"}"#
        );
    }
}
