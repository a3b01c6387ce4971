use super::{PROVIDER_PREFIX, RunConfig};

const MAX_NODE_COUNT: u32 = 100;

impl RunConfig {
    /// Collect every invalid value instead of stopping at the first one.
    pub(crate) fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !valid_resource_group(&self.resource_group) {
            errors.push(format!(
                "resource_group '{}': 1-90 characters of letters, digits, '-', '_', '.', '(' or ')'",
                self.resource_group
            ));
        }
        if !valid_cluster_name(&self.cluster_name) {
            errors.push(format!(
                "cluster_name '{}': 1-63 characters of letters, digits and '-'",
                self.cluster_name
            ));
        }
        if !(5..=50).contains(&self.acr_name.len())
            || !self.acr_name.chars().all(|c| c.is_ascii_alphanumeric())
        {
            errors.push(format!(
                "acr_name '{}': 5-50 alphanumeric characters",
                self.acr_name
            ));
        }
        if !valid_kubernetes_version(&self.kubernetes_version) {
            errors.push(format!(
                "kubernetes_version '{}': expected MAJOR.MINOR or MAJOR.MINOR.PATCH",
                self.kubernetes_version
            ));
        }
        if self.node_count == 0 || self.node_count > MAX_NODE_COUNT {
            errors.push(format!(
                "node_count {}: must be between 1 and {MAX_NODE_COUNT}",
                self.node_count
            ));
        }
        for (key, value) in [
            ("location", &self.location),
            ("node_vm_size", &self.node_vm_size),
            ("identity_name", &self.identity_name),
            ("provider_version", &self.provider_version),
            ("connection_secret_name", &self.connection_secret_name),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{key}: must not be empty"));
            }
        }
        if self.harbor_admin_password.is_empty() {
            errors.push("harbor_admin_password: must not be empty".to_string());
        }
        for (key, value) in [
            ("app_namespace", &self.app_namespace),
            ("connection_secret_namespace", &self.connection_secret_namespace),
        ] {
            if !is_dns_label(value) {
                errors.push(format!("{key} '{value}': not a valid DNS-1123 label"));
            }
        }

        if self.providers.is_empty() {
            errors.push("providers: at least one provider is required".to_string());
        }
        for provider in &self.providers {
            if !provider.starts_with(PROVIDER_PREFIX) || !is_dns_label(provider) {
                errors.push(format!(
                    "providers '{provider}': must be a DNS label starting with '{PROVIDER_PREFIX}'"
                ));
            }
        }
        if self.announce_services.is_empty() {
            errors.push("announce_services: at least one service is required".to_string());
        }
        for service in &self.announce_services {
            if !is_dns_label(service) {
                errors.push(format!("announce_services '{service}': not a valid DNS label"));
            }
        }

        let interval = self.timeouts.poll_interval_secs;
        if interval == 0 {
            errors.push("timeouts.poll_interval_secs: must be greater than 0".to_string());
        }
        for (key, value) in self.timeouts.named().into_iter().skip(1) {
            if value < interval {
                errors.push(format!(
                    "{key} {value}: must be at least the poll interval ({interval}s)"
                ));
            }
        }

        errors
    }
}

fn valid_resource_group(name: &str) -> bool {
    (1..=90).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.()".contains(c))
        && !name.ends_with('.')
}

fn valid_cluster_name(name: &str) -> bool {
    (1..=63).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

fn valid_kubernetes_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// RFC 1123 label: lowercase alphanumerics and '-', at most 63 characters,
/// starting and ending with an alphanumeric.
pub(crate) fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecretString;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RunConfig::default().validation_errors().is_empty());
    }

    #[test]
    fn test_dns_label() {
        assert!(is_dns_label("gws"));
        assert!(is_dns_label("provider-azure-network"));
        assert!(!is_dns_label("Gws"));
        assert!(!is_dns_label("-gws"));
        assert!(!is_dns_label("gws-"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label(&"a".repeat(64)));
    }

    #[test]
    fn test_kubernetes_version() {
        assert!(valid_kubernetes_version("1.30"));
        assert!(valid_kubernetes_version("1.30.4"));
        assert!(!valid_kubernetes_version("1"));
        assert!(!valid_kubernetes_version("v1.30"));
        assert!(!valid_kubernetes_version("1..30"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RunConfig::default();
        config.node_count = 0;
        config.harbor_admin_password = SecretString::new("");
        config.providers = vec!["upbound-provider-family-azure".to_string()];
        config.timeouts.discovery_secs = 1;

        let errors = config.validation_errors();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.starts_with("node_count")));
        assert!(errors.iter().any(|e| e.starts_with("harbor_admin_password")));
        assert!(errors.iter().any(|e| e.contains("upbound-provider-family-azure")));
        assert!(errors.iter().any(|e| e.starts_with("timeouts.discovery_secs")));
    }

    #[test]
    fn test_zero_poll_interval() {
        let mut config = RunConfig::default();
        config.timeouts.poll_interval_secs = 0;
        let errors = config.validation_errors();
        assert_eq!(errors, vec!["timeouts.poll_interval_secs: must be greater than 0"]);
    }
}
