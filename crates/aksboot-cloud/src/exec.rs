use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use aksboot_runner::{CommandSpec, ProcessOutput, ProcessRunner};
use aksboot_utils::BootstrapError;
use aksboot_utils::error::is_not_found_output;

/// Longest stderr excerpt carried in an error.
const STDERR_EXCERPT: usize = 2000;

/// Command execution with logging and exit-status interpretation.
#[derive(Clone)]
pub struct Exec {
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl Exec {
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Run `cmd` and return its raw output, whatever the exit code.
    pub async fn output(&self, cmd: &CommandSpec) -> Result<ProcessOutput, BootstrapError> {
        debug!(command = %cmd.display(), "exec");
        let start = Instant::now();
        let output = self.runner.run(cmd, self.timeout).await?;
        debug!(
            command = %cmd.display(),
            exit_code = ?output.exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "exec finished"
        );
        Ok(output)
    }

    /// Run `cmd`; a non-zero exit is [`BootstrapError::CommandFailed`].
    pub async fn run(&self, cmd: &CommandSpec) -> Result<String, BootstrapError> {
        let output = self.output(cmd).await?;
        if output.success() {
            Ok(output.stdout_string())
        } else {
            Err(command_failed(cmd, &output))
        }
    }

    /// Run `cmd` and parse stdout as JSON.
    pub async fn json<T: DeserializeOwned>(&self, cmd: &CommandSpec) -> Result<T, BootstrapError> {
        let stdout = self.run(cmd).await?;
        parse_json(cmd, &stdout)
    }

    /// Run a lookup: `Ok(None)` when the tool reports the object as not found.
    pub async fn probe(&self, cmd: &CommandSpec) -> Result<Option<String>, BootstrapError> {
        let output = self.output(cmd).await?;
        if output.success() {
            return Ok(Some(output.stdout_string()));
        }
        if is_not_found_output(output.exit_code, &output.stderr_string()) {
            debug!(command = %cmd.display(), "not found");
            return Ok(None);
        }
        Err(command_failed(cmd, &output))
    }

    /// [`Exec::probe`] with the answer parsed as JSON.
    pub async fn probe_json<T: DeserializeOwned>(
        &self,
        cmd: &CommandSpec,
    ) -> Result<Option<T>, BootstrapError> {
        match self.probe(cmd).await? {
            Some(stdout) => parse_json(cmd, &stdout).map(Some),
            None => Ok(None),
        }
    }
}

fn parse_json<T: DeserializeOwned>(cmd: &CommandSpec, stdout: &str) -> Result<T, BootstrapError> {
    serde_json::from_str(stdout.trim())
        .map_err(|e| BootstrapError::parse(format!("output of `{}`", cmd.display()), e))
}

/// Build the error for a command that exited unsuccessfully.
#[must_use]
pub fn command_failed(cmd: &CommandSpec, output: &ProcessOutput) -> BootstrapError {
    let stderr = output.stderr_string();
    let stderr = stderr.trim();
    let excerpt = match stderr.char_indices().nth(STDERR_EXCERPT) {
        Some((idx, _)) => format!("{}…", &stderr[..idx]),
        None => stderr.to_string(),
    };
    BootstrapError::CommandFailed {
        command: cmd.display(),
        exit_code: output.exit_code,
        stderr: excerpt,
    }
}
