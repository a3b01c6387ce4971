use crate::error::RunnerError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{CommandSpec, ProcessOutput, ProcessRunner};

// ============================================================================
// NativeRunner - argv-only native process execution
// ============================================================================

/// Native process runner on top of `tokio::process`.
///
/// - Uses `Command::new().args()` only, no shell
/// - Writes [`CommandSpec::stdin`] to the child and closes the pipe
/// - Kills the child when the timeout elapses (`kill_on_drop`)
///
/// # Example
///
/// ```rust,no_run
/// use aksboot_runner::{CommandSpec, NativeRunner, ProcessRunner};
/// use std::time::Duration;
///
/// # async fn example() {
/// let runner = NativeRunner::new();
/// let cmd = CommandSpec::new("kubectl").args(["version", "--client"]);
/// let output = runner.run(&cmd, Duration::from_secs(30)).await.unwrap();
/// assert!(output.success());
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRunner;

impl NativeRunner {
    /// Create a new `NativeRunner`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for NativeRunner {
    async fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        debug!(command = %cmd.display(), timeout_s = timeout.as_secs(), "exec");

        let mut command = cmd.to_tokio_command();
        command
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: cmd.program_name(),
            reason: e.to_string(),
        })?;

        if let (Some(payload), Some(mut stdin)) = (cmd.stdin.as_ref(), child.stdin.take()) {
            stdin
                .write_all(payload)
                .await
                .map_err(|e| RunnerError::StdinFailed {
                    program: cmd.program_name(),
                    reason: e.to_string(),
                })?;
            // Dropping the handle closes the pipe so the child sees EOF.
            drop(stdin);
        }

        // On timeout the future owning `child` is dropped, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProcessOutput::new(
                output.stdout,
                output.stderr,
                output.status.code(),
            )),
            Ok(Err(e)) => Err(RunnerError::WaitFailed {
                program: cmd.program_name(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RunnerError::Timeout {
                command: cmd.display(),
                timeout_seconds: timeout.as_secs(),
            }),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_native_runner_echo_command() {
        let runner = NativeRunner::new();
        let cmd = CommandSpec::new("echo").arg("hello world");

        let output = runner.run(&cmd, Duration::from_secs(10)).await.unwrap();
        assert!(output.success());
        assert!(output.stdout_string().contains("hello world"));
    }

    #[tokio::test]
    async fn test_native_runner_feeds_stdin() {
        let runner = NativeRunner::new();
        let cmd = CommandSpec::new("cat").stdin(b"apiVersion: v1\nkind: Namespace\n".to_vec());

        let output = runner.run(&cmd, Duration::from_secs(10)).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_string(), "apiVersion: v1\nkind: Namespace\n");
    }

    #[tokio::test]
    async fn test_native_runner_reports_exit_code() {
        let runner = NativeRunner::new();
        let cmd = CommandSpec::new("sh").args(["-c", "echo nope >&2; exit 3"]);

        let output = runner.run(&cmd, Duration::from_secs(10)).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(output.stderr_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_native_runner_timeout() {
        let runner = NativeRunner::new();
        let cmd = CommandSpec::new("sleep").arg("5");

        let result = runner.run(&cmd, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(RunnerError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_native_runner_missing_program() {
        let runner = NativeRunner::new();
        let cmd = CommandSpec::new("definitely-not-a-real-binary-aksboot");

        let result = runner.run(&cmd, Duration::from_secs(5)).await;
        match result {
            Err(RunnerError::SpawnFailed { program, .. }) => {
                assert_eq!(program, "definitely-not-a-real-binary-aksboot");
            }
            other => panic!("Expected SpawnFailed, got {other:?}"),
        }
    }
}
