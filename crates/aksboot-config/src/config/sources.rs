use std::collections::BTreeMap;

use aksboot_utils::types::ConfigSource;

use super::RunConfig;

/// Every attributable key, in display order.
pub(crate) const KEYS: &[&str] = &[
    "resource_group",
    "cluster_name",
    "location",
    "kubernetes_version",
    "node_count",
    "node_vm_size",
    "acr_name",
    "identity_name",
    "harbor_admin_password",
    "db_admin_password",
    "app_namespace",
    "repo_root",
    "git_push",
    "paths.xrd",
    "paths.composition",
    "paths.root_application",
    "paths.hosts_values",
    "paths.dashboard_dir",
    "providers",
    "provider_version",
    "announce_services",
    "connection_secret_name",
    "connection_secret_namespace",
    "timeouts.poll_interval_secs",
    "timeouts.command_secs",
    "timeouts.oidc_issuer_secs",
    "timeouts.deployment_secs",
    "timeouts.load_balancer_ip_secs",
    "timeouts.provider_healthy_secs",
    "timeouts.discovery_secs",
    "timeouts.provider_config_secs",
    "timeouts.xrd_established_secs",
    "timeouts.harbor_ready_secs",
    "timeouts.connection_secret_secs",
];

impl RunConfig {
    /// Effective configuration as `key -> (value, source)`, secrets masked.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add = |key: &str, value: String| {
            let source = self
                .source_attribution
                .get(key)
                .copied()
                .unwrap_or(ConfigSource::Default);
            config.insert(key.to_string(), (value, source.to_string()));
        };

        add("resource_group", self.resource_group.clone());
        add("cluster_name", self.cluster_name.clone());
        add("location", self.location.clone());
        add("kubernetes_version", self.kubernetes_version.clone());
        add("node_count", self.node_count.to_string());
        add("node_vm_size", self.node_vm_size.clone());
        add("acr_name", self.acr_name.clone());
        add("identity_name", self.identity_name.clone());
        add("harbor_admin_password", "***".to_string());
        add(
            "db_admin_password",
            if self.db_admin_password.is_some() {
                "***".to_string()
            } else {
                "(prompt)".to_string()
            },
        );
        add("app_namespace", self.app_namespace.clone());
        add("repo_root", self.repo_root.to_string());
        add("git_push", self.git_push.to_string());
        add("paths.xrd", self.paths.xrd.to_string());
        add("paths.composition", self.paths.composition.to_string());
        add("paths.root_application", self.paths.root_application.to_string());
        add("paths.hosts_values", self.paths.hosts_values.to_string());
        add("paths.dashboard_dir", self.paths.dashboard_dir.to_string());
        add("providers", self.providers.join(", "));
        add("provider_version", self.provider_version.clone());
        add("announce_services", self.announce_services.join(", "));
        add("connection_secret_name", self.connection_secret_name.clone());
        add("connection_secret_namespace", self.connection_secret_namespace.clone());
        for (key, value) in self.timeouts.named() {
            add(key, value.to_string());
        }

        config
    }
}
