//! `helm` wrapper with install-if-absent semantics

use tracing::info;

use aksboot_runner::CommandSpec;
use aksboot_utils::BootstrapError;

use crate::exec::Exec;
use crate::models::HelmReleaseInfo;

/// A chart release the bootstrap owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmRelease {
    pub name: String,
    pub namespace: String,
    /// Repository alias and URL, added before installing
    pub repo: (String, String),
    /// Chart reference, `<repo alias>/<chart>`
    pub chart: String,
    pub version: Option<String>,
    /// `--set key=value` pairs
    pub values: Vec<(String, String)>,
    /// `--set key=value` pairs masked in logs
    pub secret_values: Vec<(String, String)>,
}

impl HelmRelease {
    #[must_use]
    pub fn new(name: &str, namespace: &str, repo: (&str, &str), chart: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            repo: (repo.0.to_string(), repo.1.to_string()),
            chart: chart.to_string(),
            version: None,
            values: Vec::new(),
            secret_values: Vec::new(),
        }
    }

    #[must_use]
    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    #[must_use]
    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.push((key.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn set_secret(mut self, key: &str, value: impl Into<String>) -> Self {
        self.secret_values.push((key.to_string(), value.into()));
        self
    }

    fn upgrade_command(&self) -> CommandSpec {
        let mut cmd = CommandSpec::new("helm").args([
            "upgrade",
            "--install",
            self.name.as_str(),
            self.chart.as_str(),
            "--namespace",
            self.namespace.as_str(),
            "--create-namespace",
        ]);
        if let Some(version) = &self.version {
            cmd = cmd.args(["--version", version.as_str()]);
        }
        for (key, value) in &self.values {
            cmd = cmd.arg("--set").arg(format!("{key}={value}"));
        }
        for (key, value) in &self.secret_values {
            cmd = cmd.arg("--set").secret_arg(format!("{key}={value}"));
        }
        cmd
    }
}

#[derive(Clone)]
pub struct Helm {
    exec: Exec,
}

impl Helm {
    #[must_use]
    pub fn new(exec: Exec) -> Self {
        Self { exec }
    }

    /// Release status; `Ok(None)` when the release does not exist.
    pub async fn status(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<HelmReleaseInfo>, BootstrapError> {
        self.exec
            .probe_json(&CommandSpec::new("helm").args([
                "status",
                name,
                "--namespace",
                namespace,
                "-o",
                "json",
            ]))
            .await
    }

    /// True when the release exists and is `deployed`.
    pub async fn is_deployed(&self, name: &str, namespace: &str) -> Result<bool, BootstrapError> {
        Ok(self
            .status(name, namespace)
            .await?
            .is_some_and(|r| r.is_deployed()))
    }

    /// Add (or refresh) the chart repository, then `helm upgrade --install`.
    pub async fn upgrade_install(&self, release: &HelmRelease) -> Result<(), BootstrapError> {
        let (alias, url) = &release.repo;
        self.exec
            .run(&CommandSpec::new("helm").args([
                "repo",
                "add",
                alias.as_str(),
                url.as_str(),
                "--force-update",
            ]))
            .await?;
        self.exec
            .run(&CommandSpec::new("helm").args(["repo", "update", alias.as_str()]))
            .await?;

        info!(release = %release.name, chart = %release.chart, namespace = %release.namespace, "installing chart");
        self.exec.run(&release.upgrade_command()).await.map(drop)
    }

    /// Install unless a `deployed` release already exists. Returns whether it installed.
    pub async fn install_if_absent(&self, release: &HelmRelease) -> Result<bool, BootstrapError> {
        if self.is_deployed(&release.name, &release.namespace).await? {
            info!(release = %release.name, "release already deployed, skipping");
            return Ok(false);
        }
        self.upgrade_install(release).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aksboot_runner::ProcessOutput;
    use aksboot_runner::test_support::ScriptedRunner;
    use std::sync::Arc;
    use std::time::Duration;

    fn harbor() -> HelmRelease {
        HelmRelease::new("harbor", "harbor", ("harbor", "https://helm.goharbor.io"), "harbor/harbor")
            .set("expose.type", "clusterIP")
            .set_secret("harborAdminPassword", "Harbor12345")
    }

    #[tokio::test]
    async fn test_deployed_release_is_skipped() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            &["helm", "status"],
            ProcessOutput::ok(r#"{"name":"harbor","info":{"status":"deployed"}}"#),
        );
        let helm = Helm::new(Exec::new(runner.clone(), Duration::from_secs(5)));

        assert!(!helm.install_if_absent(&harbor()).await.unwrap());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_release_is_installed_with_masked_secret() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond(&["helm", "status"], ProcessOutput::failed(1, "Error: release: not found"))
            .respond(&["helm", "repo"], ProcessOutput::ok(""))
            .respond(&["helm", "upgrade"], ProcessOutput::ok(""));
        let helm = Helm::new(Exec::new(runner.clone(), Duration::from_secs(5)));

        assert!(helm.install_if_absent(&harbor()).await.unwrap());

        let specs = runner.specs();
        let upgrade = specs.last().unwrap();
        assert!(upgrade.argv().contains(&"harborAdminPassword=Harbor12345".to_string()));
        assert!(upgrade.display().contains("harborAdminPassword=***"));
        assert!(upgrade.display().contains("expose.type=clusterIP"));
    }

    #[tokio::test]
    async fn test_failed_release_is_upgraded_again() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond(&["helm", "status"], ProcessOutput::ok(r#"{"name":"harbor","info":{"status":"failed"}}"#))
            .respond(&["helm", "repo"], ProcessOutput::ok(""))
            .respond(&["helm", "upgrade"], ProcessOutput::ok(""));
        let helm = Helm::new(Exec::new(runner.clone(), Duration::from_secs(5)));
        assert!(helm.install_if_absent(&harbor()).await.unwrap());
        assert_eq!(runner.calls_matching(&["helm", "upgrade"]).len(), 1);
    }
}
