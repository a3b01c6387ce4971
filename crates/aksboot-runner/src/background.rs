//! Scoped background processes
//!
//! The pipeline needs exactly one long-running helper: a `kubectl port-forward`
//! tunnel to reach an in-cluster service. [`BackgroundProcess`] owns that child and
//! terminates it when dropped, so the tunnel never outlives the scope that opened it,
//! whether the scope ends normally, through `?`, a panic, or a cancelled future.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, warn};

use crate::{CommandSpec, RunnerError};

/// Guard around a spawned helper process.
#[derive(Debug)]
pub struct BackgroundProcess {
    label: String,
    child: Option<Child>,
}

impl BackgroundProcess {
    /// Spawn `cmd` detached from our stdio.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::SpawnFailed`] when the program cannot be started.
    pub fn spawn(cmd: &CommandSpec) -> Result<Self, RunnerError> {
        let mut command = cmd.to_tokio_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: cmd.program_name(),
            reason: e.to_string(),
        })?;

        debug!(command = %cmd.display(), pid = ?child.id(), "background process started");

        Ok(Self {
            label: cmd.display(),
            child: Some(child),
        })
    }

    /// OS process id, if the child is still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// True when the child has already exited on its own.
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }

    /// Stop the child gracefully (SIGTERM), falling back to a hard kill.
    pub async fn shutdown(mut self) {
        if let Some(mut child) = self.child.take() {
            terminate(&child);
            if tokio::time::timeout(Duration::from_secs(2), child.wait())
                .await
                .is_err()
            {
                if let Err(e) = child.kill().await {
                    warn!(process = %self.label, error = %e, "failed to kill background process");
                }
            }
            debug!(process = %self.label, "background process stopped");
        }
    }
}

impl Drop for BackgroundProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            terminate(&child);
            let _ = child.start_kill();
            debug!(process = %self.label, "background process dropped");
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    // A killed but unreaped child lingers as a zombie, which still accepts signals.
    fn alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat.contains(") Z") && !stat.contains(") X"),
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_child() {
        let proc = BackgroundProcess::spawn(&CommandSpec::new("sleep").arg("30")).unwrap();
        assert!(proc.id().is_some());
        proc.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_kills_child() {
        let proc = BackgroundProcess::spawn(&CommandSpec::new("sleep").arg("30")).unwrap();
        let pid = proc.id().unwrap();
        drop(proc);

        // Reaping happens in the background; give it a moment.
        let mut gone = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !alive(pid) {
                gone = true;
                break;
            }
        }
        assert!(gone, "child {pid} survived its guard");
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let result = BackgroundProcess::spawn(&CommandSpec::new("no-such-port-forwarder"));
        assert!(matches!(result, Err(RunnerError::SpawnFailed { .. })));
    }
}
