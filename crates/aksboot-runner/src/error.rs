//! Error types for runner module

use thiserror::Error;

/// Process execution errors
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Failed to write stdin of '{program}': {reason}")]
    StdinFailed { program: String, reason: String },

    #[error("Failed to wait for '{program}': {reason}")]
    WaitFailed { program: String, reason: String },

    #[error("'{command}' timed out after {timeout_seconds} seconds")]
    Timeout {
        command: String,
        timeout_seconds: u64,
    },
}
