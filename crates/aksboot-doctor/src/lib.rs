//! Doctor command for environment health checks
//!
//! Preflight for the bootstrap: every required CLI must resolve on `PATH`, then the
//! `az` session must be usable. Tools are checked before any cloud call, so a broken
//! workstation fails fast without touching Azure.

pub use aksboot_utils::types::{CheckStatus, DoctorCheck, DoctorOutput};

use chrono::Utc;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{debug, info};

use aksboot_cloud::Az;
use aksboot_cloud::models::AccountInfo;
use aksboot_utils::BootstrapError;

/// A command-line tool the pipeline shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredTool {
    pub name: &'static str,
    pub hint: &'static str,
}

/// Tools the pipeline needs, in check order.
pub const REQUIRED_TOOLS: [RequiredTool; 4] = [
    RequiredTool {
        name: "az",
        hint: "Install the Azure CLI: https://learn.microsoft.com/cli/azure/install-azure-cli",
    },
    RequiredTool {
        name: "kubectl",
        hint: "Install kubectl: https://kubernetes.io/docs/tasks/tools/ (or `az aks install-cli`)",
    },
    RequiredTool {
        name: "helm",
        hint: "Install Helm: https://helm.sh/docs/intro/install/",
    },
    RequiredTool {
        name: "git",
        hint: "Install git: https://git-scm.com/downloads",
    },
];

const SCHEMA_VERSION: &str = "1";

/// Doctor command implementation
pub struct DoctorCommand {
    az: Az,
    search_path: Option<OsString>,
}

impl DoctorCommand {
    #[must_use]
    pub fn new(az: Az) -> Self {
        Self {
            az,
            search_path: None,
        }
    }

    /// Resolve tools against `path` instead of the process `PATH`.
    #[must_use]
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    fn locate(&self, tool: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(path) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(tool, Some(path), cwd).ok()
            }
            None => which::which(tool).ok(),
        }
    }

    /// One check per required tool.
    #[must_use]
    pub fn check_tools(&self) -> Vec<DoctorCheck> {
        REQUIRED_TOOLS
            .iter()
            .map(|tool| match self.locate(tool.name) {
                Some(path) => DoctorCheck {
                    name: format!("tool:{}", tool.name),
                    status: CheckStatus::Pass,
                    details: format!("Found {} at {}", tool.name, path.display()),
                },
                None => DoctorCheck {
                    name: format!("tool:{}", tool.name),
                    status: CheckStatus::Fail,
                    details: format!("{} not found on PATH. {}", tool.name, tool.hint),
                },
            })
            .collect()
    }

    /// Check the `az` login; the account is returned on success.
    pub async fn check_login(&self) -> (DoctorCheck, Option<AccountInfo>) {
        match self.az.account_show().await {
            Ok(account) => (
                DoctorCheck {
                    name: "azure_login".to_string(),
                    status: CheckStatus::Pass,
                    details: format!(
                        "Subscription {} ({}), tenant {}",
                        account.id, account.name, account.tenant_id
                    ),
                },
                Some(account),
            ),
            Err(e) => (
                DoctorCheck {
                    name: "azure_login".to_string(),
                    status: CheckStatus::Fail,
                    details: e.to_string(),
                },
                None,
            ),
        }
    }

    /// Run every check. The login check is skipped (warn) when `az` is missing.
    pub async fn run(&self) -> DoctorOutput {
        let mut checks = self.check_tools();
        let az_present = checks
            .iter()
            .any(|c| c.name == "tool:az" && c.status == CheckStatus::Pass);

        if az_present {
            checks.push(self.check_login().await.0);
        } else {
            checks.push(DoctorCheck {
                name: "azure_login".to_string(),
                status: CheckStatus::Warn,
                details: "Skipped: az is not installed".to_string(),
            });
        }

        let ok = !checks.iter().any(|c| c.status == CheckStatus::Fail);
        DoctorOutput {
            schema_version: SCHEMA_VERSION.to_string(),
            emitted_at: Utc::now(),
            ok,
            checks,
        }
    }

    /// Preflight used by the pipeline: the first failure is fatal.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::Prerequisite`] for the first missing tool (before any cloud
    /// call), then [`BootstrapError::NotAuthenticated`] for a missing login.
    pub async fn preflight(&self) -> Result<AccountInfo, BootstrapError> {
        for tool in REQUIRED_TOOLS {
            match self.locate(tool.name) {
                Some(path) => debug!(tool = tool.name, path = %path.display(), "tool found"),
                None => {
                    return Err(BootstrapError::Prerequisite {
                        tool: tool.name.to_string(),
                        hint: tool.hint.to_string(),
                    });
                }
            }
        }

        let account = self.az.account_show().await?;
        info!(subscription = %account.id, tenant = %account.tenant_id, "azure login ok");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aksboot_cloud::Exec;
    use aksboot_runner::ProcessOutput;
    use aksboot_runner::test_support::ScriptedRunner;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn doctor(runner: &Arc<ScriptedRunner>) -> DoctorCommand {
        DoctorCommand::new(Az::new(Exec::new(runner.clone(), Duration::from_secs(5))))
    }

    /// Directory holding executable stubs for the given tools.
    #[cfg(unix)]
    fn bin_dir(tools: &[&str]) -> TempDir {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        for tool in tools {
            let path = dir.path().join(tool);
            std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    }

    fn logged_in(runner: &ScriptedRunner) {
        runner.respond(
            &["az", "account", "show"],
            ProcessOutput::ok(r#"{"id":"sub-1","tenantId":"tenant-1","name":"dev"}"#),
        );
    }

    #[tokio::test]
    async fn test_missing_tool_fails_before_cloud_call() {
        let runner = Arc::new(ScriptedRunner::new());
        logged_in(&runner);
        let empty = TempDir::new().unwrap();

        let err = doctor(&runner)
            .with_search_path(empty.path())
            .preflight()
            .await
            .unwrap_err();

        match err {
            BootstrapError::Prerequisite { tool, hint } => {
                assert_eq!(tool, "az");
                assert!(hint.contains("Azure CLI"));
            }
            other => panic!("expected prerequisite error, got {other:?}"),
        }
        assert!(runner.calls().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reports_first_missing_tool_in_order() {
        let runner = Arc::new(ScriptedRunner::new());
        let bins = bin_dir(&["az", "kubectl", "git"]);

        let err = doctor(&runner)
            .with_search_path(bins.path())
            .preflight()
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Prerequisite { ref tool, .. } if tool == "helm"));
        assert!(runner.calls().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_preflight_returns_account() {
        let runner = Arc::new(ScriptedRunner::new());
        logged_in(&runner);
        let bins = bin_dir(&["az", "kubectl", "helm", "git"]);

        let account = doctor(&runner)
            .with_search_path(bins.path())
            .preflight()
            .await
            .unwrap();
        assert_eq!(account.id, "sub-1");
        assert_eq!(runner.calls_matching(&["az", "account", "show"]).len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_login_failure() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            &["az", "account", "show"],
            ProcessOutput::failed(1, "ERROR: Please run 'az login' to setup account."),
        );
        let bins = bin_dir(&["az", "kubectl", "helm", "git"]);

        let output = doctor(&runner).with_search_path(bins.path()).run().await;
        assert!(!output.ok);
        assert_eq!(output.checks.len(), 5);
        assert_eq!(output.first_failure().unwrap().name, "azure_login");

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["checks"][4]["status"], "fail");
    }

    #[tokio::test]
    async fn test_run_skips_login_without_az() {
        let runner = Arc::new(ScriptedRunner::new());
        let empty = TempDir::new().unwrap();
        let output = doctor(&runner).with_search_path(empty.path()).run().await;
        assert!(!output.ok);
        assert_eq!(output.checks.last().unwrap().status, CheckStatus::Warn);
        assert!(runner.calls().is_empty());
    }
}
