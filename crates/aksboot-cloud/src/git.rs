//! `git` wrapper for the one tracked file the bootstrap edits

use camino::Utf8Path;

use tracing::debug;

use aksboot_runner::CommandSpec;
use aksboot_utils::BootstrapError;

use crate::exec::{Exec, command_failed};

#[derive(Clone)]
pub struct Git {
    exec: Exec,
}

fn git(repo: &Utf8Path) -> CommandSpec {
    CommandSpec::new("git")
        .cwd(repo.as_std_path())
        .env("GIT_TERMINAL_PROMPT", "0")
}

impl Git {
    #[must_use]
    pub fn new(exec: Exec) -> Self {
        Self { exec }
    }

    /// True when `path` has uncommitted changes (or is untracked).
    pub async fn is_dirty(&self, repo: &Utf8Path, path: &Utf8Path) -> Result<bool, BootstrapError> {
        let out = self
            .exec
            .run(&git(repo).args(["status", "--porcelain", "--", path.as_str()]))
            .await?;
        Ok(!out.trim().is_empty())
    }

    /// Stage and commit exactly `path`.
    pub async fn commit_file(
        &self,
        repo: &Utf8Path,
        path: &Utf8Path,
        message: &str,
    ) -> Result<(), BootstrapError> {
        self.exec
            .run(&git(repo).args(["add", "--", path.as_str()]))
            .await?;
        self.exec
            .run(&git(repo).args(["commit", "-m", message, "--", path.as_str()]))
            .await
            .map(drop)
    }

    /// Commits on `HEAD` that the upstream branch does not have yet.
    ///
    /// A branch without an upstream counts as zero: there is nothing to compare against.
    pub async fn unpushed_commits(&self, repo: &Utf8Path) -> Result<u32, BootstrapError> {
        let cmd = git(repo).args(["rev-list", "--count", "@{upstream}..HEAD"]);
        let output = self.exec.output(&cmd).await?;
        if !output.success() {
            let stderr = output.stderr_string();
            if stderr.contains("no upstream") {
                debug!(repo = %repo, "branch has no upstream");
                return Ok(0);
            }
            return Err(command_failed(&cmd, &output));
        }
        let stdout = output.stdout_string();
        stdout
            .trim()
            .parse()
            .map_err(|e| BootstrapError::parse(format!("output of `{}`", cmd.display()), e))
    }

    pub async fn push(&self, repo: &Utf8Path) -> Result<(), BootstrapError> {
        self.exec.run(&git(repo).arg("push")).await.map(drop)
    }
}
