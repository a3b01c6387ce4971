use std::fmt;
use thiserror::Error;

pub use aksboot_runner::RunnerError;

/// Library-level error type for the bootstrap pipeline.
///
/// Every variant is fatal where it is raised. Whether it aborts the run is decided
/// by the stage sequencer: errors from best-effort stages are downgraded to warnings.
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration errors |
/// | 3 | Missing prerequisite tool |
/// | 4 | Not authenticated to the cloud provider |
/// | 5 | Stage failure (command failed, unparsable output, conflict) |
/// | 6 | Missing required input |
/// | 10 | Dependent-on condition timed out |
/// | 130 | Interrupted |
/// | 1 | Other errors |
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Required tool '{tool}' not found on PATH")]
    Prerequisite { tool: String, hint: String },

    #[error("Not authenticated to Azure: {reason}")]
    NotAuthenticated { reason: String },

    #[error("Command `{command}` failed with exit code {}: {stderr}", display_code(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Could not parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("Timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },

    #[error(
        "Discovered {found} of {expected} {what} matching '{pattern}' within {seconds}s"
    )]
    Discovery {
        what: String,
        pattern: String,
        expected: usize,
        found: usize,
        seconds: u64,
    },

    #[error("Missing required input: {what}")]
    MissingInput { what: String },

    #[error("Manifest {path} unusable: {reason}")]
    Manifest { path: String, reason: String },

    #[error("Registry error: {reason}")]
    Registry { reason: String },

    #[error("{field} already discovered as '{existing}', refusing to overwrite with '{attempted}'")]
    StateConflict {
        field: String,
        existing: String,
        attempted: String,
    },

    #[error("{field} has not been discovered yet")]
    Undiscovered { field: String },

    #[error("Interrupted")]
    Interrupted,
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none (signal)".to_string(), |c| c.to_string())
}

impl BootstrapError {
    /// Shorthand for [`BootstrapError::Parse`].
    pub fn parse(what: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that mean "the thing is not there", as opposed to a failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CommandFailed {
                exit_code, stderr, ..
            } => is_not_found_output(*exit_code, stderr),
            _ => false,
        }
    }

    /// Format the error for end users, with context and suggestions.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("✗ {}", self.user_message());
        if let Some(context) = self.context() {
            out.push_str(&format!("\n\n  {context}"));
        }
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\n\n  Suggestions:");
            for s in suggestions {
                out.push_str(&format!("\n    • {s}"));
            }
        }
        out
    }

    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> crate::exit_codes::ExitCode {
        crate::exit_codes::ExitCode::from(self)
    }
}

/// Recognize "not found" answers from `az` and `kubectl`.
///
/// `az` exits with code 3 for missing resources; both tools name the condition in
/// stderr (`ResourceNotFound`, `(NotFound)`, `NotFound`, `not found`).
#[must_use]
pub fn is_not_found_output(exit_code: Option<i32>, stderr: &str) -> bool {
    if exit_code == Some(3) {
        return true;
    }
    ["ResourceNotFound", "NotFound", "not found", "could not be found"]
        .iter()
        .any(|marker| stderr.contains(marker))
}

/// Recognize "already exists" answers from create calls.
#[must_use]
pub fn is_already_exists_output(stderr: &str) -> bool {
    ["AlreadyExists", "already exists", "Conflict"]
        .iter()
        .any(|marker| stderr.contains(marker))
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Invalid configuration value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Prerequisite,
    Authentication,
    ExternalCommand,
    Convergence,
    Input,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Prerequisite => write!(f, "Prerequisite"),
            Self::Authentication => write!(f, "Authentication"),
            Self::ExternalCommand => write!(f, "External Command"),
            Self::Convergence => write!(f, "Convergence"),
            Self::Input => write!(f, "Input"),
            Self::Internal => write!(f, "Internal"),
        }
    }
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => format!("Configuration file has invalid format: {reason}"),
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::InvalidValue { key, value, reason } => {
                format!("Configuration '{key}' has invalid value '{value}': {reason}")
            }
            Self::ValidationFailed { errors, .. } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Values are read from built-in defaults, then the --config TOML file, then environment variables."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of the file passed with --config".to_string(),
            ],
            Self::NotFound { .. } => vec![
                "Pass an existing file to --config or omit the flag".to_string(),
            ],
            Self::InvalidValue { key, .. } => vec![format!(
                "Fix the value of '{key}' in the environment or the config file"
            )],
            Self::ValidationFailed { .. } => vec![
                "Run `aksboot plan --verbose` to see every effective value and its source".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

impl UserFriendlyError for BootstrapError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            other => other.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Prerequisite { hint, .. } => Some(hint.clone()),
            Self::NotAuthenticated { .. } => Some(
                "Every stage talks to Azure through the az CLI session of the current user."
                    .to_string(),
            ),
            Self::Timeout { .. } | Self::Discovery { .. } => Some(
                "A later stage depends on this value, so the run cannot continue without it."
                    .to_string(),
            ),
            Self::MissingInput { .. } => Some(
                "Secrets are read from the environment or prompted for on a terminal.".to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        let mut suggestions = match self {
            Self::Config(e) => return e.suggestions(),
            Self::Prerequisite { tool, .. } => {
                vec![format!("Install '{tool}' and make sure it is on PATH")]
            }
            Self::NotAuthenticated { .. } => vec![
                "Run `az login` and select the target subscription with `az account set`"
                    .to_string(),
            ],
            Self::MissingInput { what } => {
                vec![format!("Provide {what} and re-run")]
            }
            Self::Timeout { .. } | Self::Discovery { .. } => vec![
                "Inspect the controller with `kubectl get pods -A` and `kubectl describe`".to_string(),
            ],
            _ => Vec::new(),
        };
        suggestions.push("Fix the underlying cause and re-run; every stage is safe to repeat".to_string());
        suggestions
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Prerequisite { .. } => ErrorCategory::Prerequisite,
            Self::NotAuthenticated { .. } => ErrorCategory::Authentication,
            Self::Runner(_)
            | Self::CommandFailed { .. }
            | Self::Parse { .. }
            | Self::Manifest { .. }
            | Self::Registry { .. } => ErrorCategory::ExternalCommand,
            Self::Timeout { .. } | Self::Discovery { .. } => ErrorCategory::Convergence,
            Self::MissingInput { .. } => ErrorCategory::Input,
            Self::Io(_) | Self::StateConflict { .. } | Self::Undiscovered { .. } | Self::Interrupted => {
                ErrorCategory::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found_output(Some(3), ""));
        assert!(is_not_found_output(
            Some(1),
            "ERROR: (ResourceNotFound) The Resource 'Microsoft.ContainerService/managedClusters/gws-aks' was not found."
        ));
        assert!(is_not_found_output(
            Some(1),
            "Error from server (NotFound): namespaces \"argocd\" not found"
        ));
        assert!(!is_not_found_output(Some(1), "ERROR: AuthorizationFailed"));
    }

    #[test]
    fn test_already_exists_detection() {
        assert!(is_already_exists_output(
            "Error from server (AlreadyExists): namespaces \"harbor\" already exists"
        ));
        assert!(!is_already_exists_output("ERROR: BadRequest"));
    }

    #[test]
    fn test_command_failed_message_names_command() {
        let err = BootstrapError::CommandFailed {
            command: "az group create --name gws-rg".to_string(),
            exit_code: Some(1),
            stderr: "quota exceeded".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("az group create --name gws-rg"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("quota exceeded"));
    }

    #[test]
    fn test_display_for_user_includes_suggestions() {
        let err = BootstrapError::Prerequisite {
            tool: "helm".to_string(),
            hint: "Install Helm: https://helm.sh/docs/intro/install/".to_string(),
        };
        let shown = err.display_for_user();
        assert!(shown.contains("'helm' not found"));
        assert!(shown.contains("https://helm.sh"));
        assert!(shown.contains("Suggestions:"));
        assert_eq!(err.category(), ErrorCategory::Prerequisite);
    }
}
