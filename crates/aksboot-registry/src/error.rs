use thiserror::Error;

use aksboot_utils::BootstrapError;

/// Errors talking to the Harbor API
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("Harbor returned {status} for {method} {path}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {path}: {reason}")]
    Decode { path: String, reason: String },
}

impl RegistryError {
    /// Transport-level failures: Harbor not (yet) reachable through the tunnel.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status == 502 || *status == 503 || *status == 504,
            Self::Decode { .. } => false,
        }
    }
}

impl From<RegistryError> for BootstrapError {
    fn from(err: RegistryError) -> Self {
        BootstrapError::Registry {
            reason: err.to_string(),
        }
    }
}
