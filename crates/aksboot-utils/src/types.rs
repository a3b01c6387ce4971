//! Shared output types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output of `aksboot doctor`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorOutput {
    /// Schema version for this doctor format
    pub schema_version: String,
    /// RFC3339 UTC timestamp when the doctor output was emitted
    pub emitted_at: DateTime<Utc>,
    /// Overall health status (false if any check failed)
    pub ok: bool,
    /// Checks in execution order
    pub checks: Vec<DoctorCheck>,
}

impl DoctorOutput {
    /// First failed check, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&DoctorCheck> {
        self.checks.iter().find(|c| c.status == CheckStatus::Fail)
    }
}

/// Individual health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorCheck {
    /// Name of the check
    pub name: String,
    /// Status of the check
    pub status: CheckStatus,
    /// Details about the check result
    pub details: String,
}

/// Status of a health check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Source of a configuration value.
///
/// Precedence, lowest to highest: built-in defaults, the `--config` file, the
/// environment. Values set through code (tests, embedding) are `Programmatic`.
///
/// Serializes to lowercase strings: `"default"`, `"config"`, `"env"`, `"programmatic"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    Config,
    Env,
    Programmatic,
}

impl ConfigSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Config => "config",
            Self::Env => "env",
            Self::Programmatic => "programmatic",
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ConfigSource::Env).unwrap(), r#""env""#);
        assert_eq!(ConfigSource::Config.to_string(), "config");
    }

    #[test]
    fn test_doctor_output_first_failure() {
        let output = DoctorOutput {
            schema_version: "1".to_string(),
            emitted_at: Utc::now(),
            ok: false,
            checks: vec![
                DoctorCheck {
                    name: "tool:az".to_string(),
                    status: CheckStatus::Pass,
                    details: "/usr/bin/az".to_string(),
                },
                DoctorCheck {
                    name: "tool:helm".to_string(),
                    status: CheckStatus::Fail,
                    details: "not found on PATH".to_string(),
                },
            ],
        };
        assert_eq!(output.first_failure().map(|c| c.name.as_str()), Some("tool:helm"));
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["checks"][1]["status"], "fail");
    }
}
