use crate::error::RunnerError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::CommandSpec;

// ============================================================================
// ProcessRunner Trait - argv-only process execution interface
// ============================================================================

/// Output from a process execution.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Standard output from the process
    pub stdout: Vec<u8>,
    /// Standard error from the process
    pub stderr: Vec<u8>,
    /// Exit code from the process (None if terminated by signal)
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    /// Create a new `ProcessOutput` with the given values.
    #[must_use]
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i32>) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }

    /// Successful output carrying `stdout`.
    #[must_use]
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self::new(stdout.into(), Vec::new(), Some(0))
    }

    /// Failed output with the given exit code and stderr.
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self::new(Vec::new(), stderr.into(), Some(exit_code))
    }

    /// Get stdout as a UTF-8 string, lossy conversion.
    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a UTF-8 string, lossy conversion.
    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Check if the process exited successfully (exit code 0).
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for process execution.
///
/// Implementations MUST use argv-style APIs only (no shell string evaluation).
/// A non-zero exit code is NOT an error at this layer: callers decide whether
/// "not found" is an expected answer or a failure.
///
/// # Returns
///
/// * `Ok(ProcessOutput)` - The process completed (possibly with non-zero exit code)
/// * `Err(RunnerError::Timeout)` - The process exceeded `timeout` and was killed
/// * `Err(RunnerError::*)` - The process could not be spawned or awaited
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Execute a command with the given timeout.
    async fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError>;
}

#[async_trait]
impl<R: ProcessRunner + ?Sized> ProcessRunner for Arc<R> {
    async fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        (**self).run(cmd, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_output_success() {
        assert!(ProcessOutput::ok("x").success());
        assert!(!ProcessOutput::failed(1, "boom").success());
        // killed by signal
        assert!(!ProcessOutput::new(Vec::new(), Vec::new(), None).success());
    }

    #[test]
    fn test_process_output_lossy_utf8() {
        let invalid_utf8 = vec![0xff, 0xfe, 0x00, 0x01];
        let output = ProcessOutput::new(invalid_utf8.clone(), invalid_utf8, Some(0));
        assert!(!output.stdout_string().is_empty());
        assert!(!output.stderr_string().is_empty());
    }

    struct TimeoutRunner;

    #[async_trait]
    impl ProcessRunner for TimeoutRunner {
        async fn run(
            &self,
            cmd: &CommandSpec,
            timeout: Duration,
        ) -> Result<ProcessOutput, RunnerError> {
            Err(RunnerError::Timeout {
                command: cmd.display(),
                timeout_seconds: timeout.as_secs(),
            })
        }
    }

    #[tokio::test]
    async fn test_arc_runner_delegates() {
        let runner: Arc<dyn ProcessRunner> = Arc::new(TimeoutRunner);
        let result = runner
            .run(&CommandSpec::new("helm").arg("version"), Duration::from_secs(60))
            .await;

        match result {
            Err(RunnerError::Timeout {
                command,
                timeout_seconds,
            }) => {
                assert_eq!(command, "helm version");
                assert_eq!(timeout_seconds, 60);
            }
            other => panic!("Expected Timeout error, got {other:?}"),
        }
    }
}
