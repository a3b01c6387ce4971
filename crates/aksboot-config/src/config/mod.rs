mod env;
mod model;
mod sources;
mod validation;

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;

use aksboot_utils::ConfigError;
use aksboot_utils::types::ConfigSource;

pub use env::{EnvSource, ProcessEnv};
pub use model::{
    AzureSection, FileConfig, GitopsSection, PayloadPaths, PlatformSection, SecretString,
    Timeouts, TimeoutsSection,
};

/// Namespace Crossplane and its providers run in.
pub const CROSSPLANE_NAMESPACE: &str = "crossplane-system";

/// Prefix every managed Azure provider's service account starts with.
pub const PROVIDER_PREFIX: &str = "provider-azure-";

/// Effective configuration of one bootstrap run.
///
/// Loaded once with [`RunConfig::load`] and never mutated afterwards; stages only
/// read it. Values discovered at run time live in the stage context, not here.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub resource_group: String,
    pub cluster_name: String,
    pub location: String,
    pub kubernetes_version: String,
    pub node_count: u32,
    pub node_vm_size: String,
    pub acr_name: String,
    /// User-assigned managed identity federated with the provider service accounts
    pub identity_name: String,
    pub harbor_admin_password: SecretString,
    /// Only ever read from the environment; prompted for when absent
    pub db_admin_password: Option<SecretString>,
    pub app_namespace: String,
    pub repo_root: Utf8PathBuf,
    pub git_push: bool,
    pub paths: PayloadPaths,
    /// Crossplane provider packages, one service account expected per entry
    pub providers: Vec<String>,
    pub provider_version: String,
    /// Services that get a `<service>.<ip>.nip.io` hostname
    pub announce_services: Vec<String>,
    pub connection_secret_name: String,
    pub connection_secret_namespace: String,
    pub timeouts: Timeouts,
    /// Source attribution for each key (for `plan --verbose`)
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let mut config = Self {
            resource_group: "gws-rg".to_string(),
            cluster_name: "gws-aks".to_string(),
            location: "westeurope".to_string(),
            kubernetes_version: "1.30".to_string(),
            node_count: 2,
            node_vm_size: "Standard_D2s_v3".to_string(),
            acr_name: "gwsacr".to_string(),
            identity_name: "gws-crossplane-identity".to_string(),
            harbor_admin_password: SecretString::new("Harbor12345"),
            db_admin_password: None,
            app_namespace: "gws".to_string(),
            repo_root: Utf8PathBuf::from("."),
            git_push: true,
            paths: PayloadPaths::default(),
            providers: vec![
                "provider-azure-dbforpostgresql".to_string(),
                "provider-azure-network".to_string(),
            ],
            provider_version: "v1.3.0".to_string(),
            announce_services: vec![
                "argocd".to_string(),
                "dashboard".to_string(),
                "harbor".to_string(),
            ],
            connection_secret_name: "gws-postgres-conn".to_string(),
            connection_secret_namespace: CROSSPLANE_NAMESPACE.to_string(),
            timeouts: Timeouts::default(),
            source_attribution: HashMap::new(),
        };
        for key in sources::KEYS {
            config
                .source_attribution
                .insert((*key).to_string(), ConfigSource::Default);
        }
        config
    }
}

impl RunConfig {
    /// Load the effective configuration.
    ///
    /// Precedence, lowest first: built-in defaults, `config_file` (when given),
    /// environment variables from `env`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotFound`] when `config_file` does not exist
    /// - [`ConfigError::InvalidFile`] when it is not valid TOML of the expected shape
    /// - [`ConfigError::ValidationFailed`] listing every invalid value, including
    ///   unparsable environment variables
    pub fn load(config_file: Option<&Utf8Path>, env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_file {
            let file = FileConfig::read(path)?;
            config.apply_file(file);
        }

        let mut errors = Vec::new();
        config.apply_env(env, &mut errors);
        errors.extend(config.validation_errors());

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::ValidationFailed {
                error_count: errors.len(),
                errors,
            })
        }
    }

    /// Absolute (or repo-root-relative) path of a payload.
    #[must_use]
    pub fn payload(&self, path: &Utf8Path) -> Utf8PathBuf {
        PayloadPaths::resolve(&self.repo_root, path)
    }

    /// Number of provider service accounts name discovery waits for.
    #[must_use]
    pub fn expected_provider_accounts(&self) -> usize {
        self.providers.len()
    }

    /// Fully qualified Crossplane package reference for a provider.
    #[must_use]
    pub fn provider_package(&self, provider: &str) -> String {
        format!("xpkg.upbound.io/upbound/{provider}:{}", self.provider_version)
    }

    fn apply_file(&mut self, file: FileConfig) {
        let mut set = Layer {
            attribution: &mut self.source_attribution,
            source: ConfigSource::Config,
        };

        let FileConfig {
            azure,
            platform,
            gitops,
            timeouts,
        } = file;

        set.value("resource_group", &mut self.resource_group, azure.resource_group);
        set.value("cluster_name", &mut self.cluster_name, azure.cluster_name);
        set.value("location", &mut self.location, azure.location);
        set.value("kubernetes_version", &mut self.kubernetes_version, azure.kubernetes_version);
        set.value("node_count", &mut self.node_count, azure.node_count);
        set.value("node_vm_size", &mut self.node_vm_size, azure.node_vm_size);
        set.value("acr_name", &mut self.acr_name, azure.acr_name);
        set.value("identity_name", &mut self.identity_name, azure.identity_name);

        set.value("app_namespace", &mut self.app_namespace, platform.app_namespace);
        set.value(
            "harbor_admin_password",
            &mut self.harbor_admin_password,
            platform.harbor_admin_password,
        );
        set.value("providers", &mut self.providers, platform.providers);
        set.value("provider_version", &mut self.provider_version, platform.provider_version);
        set.value("announce_services", &mut self.announce_services, platform.announce_services);
        set.value(
            "connection_secret_name",
            &mut self.connection_secret_name,
            platform.connection_secret_name,
        );
        set.value(
            "connection_secret_namespace",
            &mut self.connection_secret_namespace,
            platform.connection_secret_namespace,
        );

        set.value("repo_root", &mut self.repo_root, gitops.repo_root);
        set.value("git_push", &mut self.git_push, gitops.git_push);
        set.value("paths.xrd", &mut self.paths.xrd, gitops.xrd);
        set.value("paths.composition", &mut self.paths.composition, gitops.composition);
        set.value(
            "paths.root_application",
            &mut self.paths.root_application,
            gitops.root_application,
        );
        set.value("paths.hosts_values", &mut self.paths.hosts_values, gitops.hosts_values);
        set.value("paths.dashboard_dir", &mut self.paths.dashboard_dir, gitops.dashboard_dir);

        let t = &mut self.timeouts;
        set.value("timeouts.poll_interval_secs", &mut t.poll_interval_secs, timeouts.poll_interval_secs);
        set.value("timeouts.command_secs", &mut t.command_secs, timeouts.command_secs);
        set.value("timeouts.oidc_issuer_secs", &mut t.oidc_issuer_secs, timeouts.oidc_issuer_secs);
        set.value("timeouts.deployment_secs", &mut t.deployment_secs, timeouts.deployment_secs);
        set.value(
            "timeouts.load_balancer_ip_secs",
            &mut t.load_balancer_ip_secs,
            timeouts.load_balancer_ip_secs,
        );
        set.value(
            "timeouts.provider_healthy_secs",
            &mut t.provider_healthy_secs,
            timeouts.provider_healthy_secs,
        );
        set.value("timeouts.discovery_secs", &mut t.discovery_secs, timeouts.discovery_secs);
        set.value(
            "timeouts.provider_config_secs",
            &mut t.provider_config_secs,
            timeouts.provider_config_secs,
        );
        set.value(
            "timeouts.xrd_established_secs",
            &mut t.xrd_established_secs,
            timeouts.xrd_established_secs,
        );
        set.value("timeouts.harbor_ready_secs", &mut t.harbor_ready_secs, timeouts.harbor_ready_secs);
        set.value(
            "timeouts.connection_secret_secs",
            &mut t.connection_secret_secs,
            timeouts.connection_secret_secs,
        );
    }

    fn apply_env(&mut self, env: &dyn EnvSource, errors: &mut Vec<String>) {
        let mut set = Layer {
            attribution: &mut self.source_attribution,
            source: ConfigSource::Env,
        };

        set.value("resource_group", &mut self.resource_group, env.var("RESOURCE_GROUP"));
        set.value("cluster_name", &mut self.cluster_name, env.var("CLUSTER_NAME"));
        set.value("location", &mut self.location, env.var("LOCATION"));
        set.value("kubernetes_version", &mut self.kubernetes_version, env.var("K8S_VERSION"));
        set.value(
            "node_count",
            &mut self.node_count,
            parse_env(env, "NODE_COUNT", errors, |v| {
                v.parse::<u32>().map_err(|e| e.to_string())
            }),
        );
        set.value("node_vm_size", &mut self.node_vm_size, env.var("NODE_VM_SIZE"));
        set.value("acr_name", &mut self.acr_name, env.var("ACR_NAME"));
        set.value("identity_name", &mut self.identity_name, env.var("IDENTITY_NAME"));
        set.value(
            "harbor_admin_password",
            &mut self.harbor_admin_password,
            env.var("HARBOR_ADMIN_PASSWORD").map(SecretString::new),
        );
        set.value("app_namespace", &mut self.app_namespace, env.var("APP_NAMESPACE"));
        set.value(
            "repo_root",
            &mut self.repo_root,
            env.var("REPO_ROOT").map(Utf8PathBuf::from),
        );
        set.value(
            "git_push",
            &mut self.git_push,
            parse_env(env, "GIT_PUSH", errors, parse_bool),
        );

        if let Some(password) = env.var("DB_ADMIN_PASSWORD") {
            self.db_admin_password = Some(SecretString::new(password));
            set.attribution
                .insert("db_admin_password".to_string(), ConfigSource::Env);
        }
    }
}

/// Writes layer values into the config and records where they came from.
struct Layer<'a> {
    attribution: &'a mut HashMap<String, ConfigSource>,
    source: ConfigSource,
}

impl Layer<'_> {
    fn value<T>(&mut self, key: &str, target: &mut T, value: Option<T>) {
        if let Some(value) = value {
            *target = value;
            self.attribution.insert(key.to_string(), self.source);
        }
    }
}

fn parse_env<T>(
    env: &dyn EnvSource,
    name: &str,
    errors: &mut Vec<String>,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Option<T> {
    let raw = env.var(name)?;
    match parse(raw.trim()) {
        Ok(value) => Some(value),
        Err(reason) => {
            errors.push(format!("{name}='{raw}': {reason}"));
            None
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err("expected true or false".to_string()),
    }
}

impl FileConfig {
    /// Read and parse a TOML config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotFound`] or [`ConfigError::InvalidFile`].
    pub fn read(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_string(),
                }
            } else {
                ConfigError::InvalidFile(format!("{path}: {e}"))
            }
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::InvalidFile(format!("{path}: {e}")))
    }
}
