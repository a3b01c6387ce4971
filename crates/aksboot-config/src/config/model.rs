use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use aksboot_utils::PollPolicy;

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The actual value. Only call this where the secret is handed to its consumer.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

/// Repository-relative locations of the declarative payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadPaths {
    pub xrd: Utf8PathBuf,
    pub composition: Utf8PathBuf,
    pub root_application: Utf8PathBuf,
    /// Values file whose `hosts` mapping the endpoint announcer rewrites
    pub hosts_values: Utf8PathBuf,
    /// Docker build context of the dashboard image
    pub dashboard_dir: Utf8PathBuf,
}

impl Default for PayloadPaths {
    fn default() -> Self {
        Self {
            xrd: "crossplane/xrd.yaml".into(),
            composition: "crossplane/composition.yaml".into(),
            root_application: "gitops/root-app.yaml".into(),
            hosts_values: "gitops/values/hosts.yaml".into(),
            dashboard_dir: "apps/dashboard".into(),
        }
    }
}

impl PayloadPaths {
    /// Resolve a payload path against the repository root. Absolute paths are kept.
    #[must_use]
    pub fn resolve(repo_root: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            repo_root.join(path)
        }
    }
}

/// Poll interval and per-condition caps, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub poll_interval_secs: u64,
    /// Upper bound for any single external command (`az aks create` is the slow one)
    pub command_secs: u64,
    pub oidc_issuer_secs: u64,
    pub deployment_secs: u64,
    pub load_balancer_ip_secs: u64,
    pub provider_healthy_secs: u64,
    pub discovery_secs: u64,
    pub provider_config_secs: u64,
    pub xrd_established_secs: u64,
    pub harbor_ready_secs: u64,
    pub connection_secret_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            command_secs: 1800,
            oidc_issuer_secs: 300,
            deployment_secs: 300,
            load_balancer_ip_secs: 300,
            provider_healthy_secs: 600,
            discovery_secs: 120,
            provider_config_secs: 300,
            xrd_established_secs: 120,
            harbor_ready_secs: 600,
            connection_secret_secs: 900,
        }
    }
}

impl Timeouts {
    /// Poll policy with the configured interval and the given cap.
    #[must_use]
    pub fn policy(&self, timeout_secs: u64) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(timeout_secs),
        )
    }

    #[must_use]
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub(crate) fn named(&self) -> [(&'static str, u64); 11] {
        [
            ("timeouts.poll_interval_secs", self.poll_interval_secs),
            ("timeouts.command_secs", self.command_secs),
            ("timeouts.oidc_issuer_secs", self.oidc_issuer_secs),
            ("timeouts.deployment_secs", self.deployment_secs),
            ("timeouts.load_balancer_ip_secs", self.load_balancer_ip_secs),
            ("timeouts.provider_healthy_secs", self.provider_healthy_secs),
            ("timeouts.discovery_secs", self.discovery_secs),
            ("timeouts.provider_config_secs", self.provider_config_secs),
            ("timeouts.xrd_established_secs", self.xrd_established_secs),
            ("timeouts.harbor_ready_secs", self.harbor_ready_secs),
            ("timeouts.connection_secret_secs", self.connection_secret_secs),
        ]
    }
}

/// On-disk shape of the `--config` TOML file. Every key is optional.
///
/// ```toml
/// [azure]
/// resource_group = "gws-rg"
/// location = "westeurope"
/// node_count = 3
///
/// [platform]
/// app_namespace = "gws"
/// providers = ["provider-azure-dbforpostgresql", "provider-azure-network"]
///
/// [gitops]
/// repo_root = "."
/// git_push = false
///
/// [timeouts]
/// poll_interval_secs = 10
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub azure: AzureSection,
    #[serde(default)]
    pub platform: PlatformSection,
    #[serde(default)]
    pub gitops: GitopsSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureSection {
    pub resource_group: Option<String>,
    pub cluster_name: Option<String>,
    pub location: Option<String>,
    pub kubernetes_version: Option<String>,
    pub node_count: Option<u32>,
    pub node_vm_size: Option<String>,
    pub acr_name: Option<String>,
    pub identity_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformSection {
    pub app_namespace: Option<String>,
    pub harbor_admin_password: Option<SecretString>,
    pub providers: Option<Vec<String>>,
    pub provider_version: Option<String>,
    pub announce_services: Option<Vec<String>>,
    pub connection_secret_name: Option<String>,
    pub connection_secret_namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitopsSection {
    pub repo_root: Option<Utf8PathBuf>,
    pub git_push: Option<bool>,
    pub xrd: Option<Utf8PathBuf>,
    pub composition: Option<Utf8PathBuf>,
    pub root_application: Option<Utf8PathBuf>,
    pub hosts_values: Option<Utf8PathBuf>,
    pub dashboard_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsSection {
    pub poll_interval_secs: Option<u64>,
    pub command_secs: Option<u64>,
    pub oidc_issuer_secs: Option<u64>,
    pub deployment_secs: Option<u64>,
    pub load_balancer_ip_secs: Option<u64>,
    pub provider_healthy_secs: Option<u64>,
    pub discovery_secs: Option<u64>,
    pub provider_config_secs: Option<u64>,
    pub xrd_established_secs: Option<u64>,
    pub harbor_ready_secs: Option<u64>,
    pub connection_secret_secs: Option<u64>,
}
