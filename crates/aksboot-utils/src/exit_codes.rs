//! Exit code constants and error mapping for aksboot.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Pipeline converged (possibly with warnings) |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CONFIG` | Invalid configuration |
//! | 3 | `PREREQUISITE` | Required tool missing from PATH |
//! | 4 | `NOT_AUTHENTICATED` | No usable `az` login |
//! | 5 | `STAGE_FAILED` | A fatal stage failed |
//! | 6 | `MISSING_INPUT` | Required interactive input was empty |
//! | 10 | `TIMEOUT` | A dependent-on condition never became ready |
//! | 130 | `INTERRUPTED` | Cancelled with Ctrl-C |

use crate::error::BootstrapError;

/// Exit codes matching the documented exit code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const INTERNAL: ExitCode = ExitCode(1);
    pub const CONFIG: ExitCode = ExitCode(2);
    pub const PREREQUISITE: ExitCode = ExitCode(3);
    pub const NOT_AUTHENTICATED: ExitCode = ExitCode(4);
    pub const STAGE_FAILED: ExitCode = ExitCode(5);
    pub const MISSING_INPUT: ExitCode = ExitCode(6);
    pub const TIMEOUT: ExitCode = ExitCode(10);
    pub const INTERRUPTED: ExitCode = ExitCode(130);

    /// Get the numeric exit code value.
    ///
    /// Use this with `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<&BootstrapError> for ExitCode {
    fn from(err: &BootstrapError) -> Self {
        match err {
            BootstrapError::Config(_) => ExitCode::CONFIG,
            BootstrapError::Prerequisite { .. } => ExitCode::PREREQUISITE,
            BootstrapError::NotAuthenticated { .. } => ExitCode::NOT_AUTHENTICATED,
            BootstrapError::MissingInput { .. } => ExitCode::MISSING_INPUT,
            BootstrapError::Timeout { .. } | BootstrapError::Discovery { .. } => ExitCode::TIMEOUT,
            BootstrapError::Interrupted => ExitCode::INTERRUPTED,
            BootstrapError::Runner(_)
            | BootstrapError::CommandFailed { .. }
            | BootstrapError::Parse { .. }
            | BootstrapError::Manifest { .. }
            | BootstrapError::Registry { .. }
            | BootstrapError::StateConflict { .. }
            | BootstrapError::Undiscovered { .. } => ExitCode::STAGE_FAILED,
            BootstrapError::Io(_) => ExitCode::INTERNAL,
        }
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_error_to_exit_code_mapping() {
        let cases: Vec<(BootstrapError, ExitCode)> = vec![
            (
                BootstrapError::Config(ConfigError::InvalidFile("x".into())),
                ExitCode::CONFIG,
            ),
            (
                BootstrapError::Prerequisite {
                    tool: "az".into(),
                    hint: String::new(),
                },
                ExitCode::PREREQUISITE,
            ),
            (
                BootstrapError::NotAuthenticated {
                    reason: "no login".into(),
                },
                ExitCode::NOT_AUTHENTICATED,
            ),
            (
                BootstrapError::MissingInput {
                    what: "database password".into(),
                },
                ExitCode::MISSING_INPUT,
            ),
            (
                BootstrapError::Timeout {
                    what: "OIDC issuer".into(),
                    seconds: 300,
                },
                ExitCode::TIMEOUT,
            ),
            (
                BootstrapError::CommandFailed {
                    command: "az aks create".into(),
                    exit_code: Some(1),
                    stderr: String::new(),
                },
                ExitCode::STAGE_FAILED,
            ),
            (
                BootstrapError::Undiscovered {
                    field: "oidc_issuer_url".into(),
                },
                ExitCode::STAGE_FAILED,
            ),
            (BootstrapError::Interrupted, ExitCode::INTERRUPTED),
        ];

        for (err, expected) in cases {
            assert_eq!(err.to_exit_code(), expected, "wrong code for {err}");
        }
    }

    #[test]
    fn test_exit_code_roundtrip() {
        assert_eq!(ExitCode::from_i32(5), ExitCode::STAGE_FAILED);
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
    }
}
