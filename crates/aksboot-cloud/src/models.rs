//! Serde models for the JSON the CLIs print
//!
//! Only the fields the bootstrap reads are modelled; everything else is ignored.

use serde::Deserialize;
use std::collections::BTreeMap;

// ============================================================================
// Azure
// ============================================================================

/// `az account show`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Subscription id
    pub id: String,
    pub tenant_id: String,
    /// Subscription display name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user: Option<AccountUser>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AccountUser {
    pub name: String,
}

/// `az group show`
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    pub location: String,
}

/// `az aks show`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCluster {
    pub name: String,
    #[serde(default)]
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub oidc_issuer_profile: Option<OidcIssuerProfile>,
    #[serde(default)]
    pub security_profile: Option<SecurityProfile>,
    /// Holds `kubeletidentity`, the identity nodes pull images with
    #[serde(default)]
    pub identity_profile: Option<BTreeMap<String, UserAssignedIdentity>>,
}

impl ManagedCluster {
    /// Issuer URL, once the control plane has published it.
    #[must_use]
    pub fn oidc_issuer_url(&self) -> Option<&str> {
        self.oidc_issuer_profile
            .as_ref()
            .filter(|p| p.enabled)
            .and_then(|p| p.issuer_url.as_deref())
            .filter(|url| !url.is_empty())
    }

    /// Object id of the kubelet identity, which needs `AcrPull` on the registry.
    #[must_use]
    pub fn kubelet_object_id(&self) -> Option<&str> {
        self.identity_profile
            .as_ref()?
            .get("kubeletidentity")
            .map(|i| i.object_id.as_str())
    }

    #[must_use]
    pub fn oidc_issuer_enabled(&self) -> bool {
        self.oidc_issuer_profile.as_ref().is_some_and(|p| p.enabled)
    }

    /// Both halves of workload identity: the issuer and the webhook.
    #[must_use]
    pub fn federation_ready(&self) -> bool {
        self.oidc_issuer_enabled() && self.workload_identity_enabled()
    }

    #[must_use]
    pub fn workload_identity_enabled(&self) -> bool {
        self.security_profile
            .as_ref()
            .and_then(|p| p.workload_identity.as_ref())
            .is_some_and(|w| w.enabled)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcIssuerProfile {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub issuer_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityProfile {
    #[serde(default)]
    pub workload_identity: Option<WorkloadIdentity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAssignedIdentity {
    pub object_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadIdentity {
    #[serde(default)]
    pub enabled: bool,
}

/// `az acr show`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRegistry {
    pub id: String,
    pub name: String,
    pub login_server: String,
}

/// `az identity show`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedIdentity {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub principal_id: String,
}

/// Entry of `az role assignment list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    #[serde(default)]
    pub role_definition_name: String,
    #[serde(default)]
    pub principal_id: String,
    #[serde(default)]
    pub scope: String,
}

/// `az identity federated-credential show`
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedCredential {
    pub name: String,
    pub issuer: String,
    pub subject: String,
    #[serde(default)]
    pub audiences: Vec<String>,
}

// ============================================================================
// Kubernetes
// ============================================================================

/// Any Kubernetes object, reduced to metadata, status and secret data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct K8sObject {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<ObjectStatus>,
    /// Base64-encoded payload of a Secret
    #[serde(default)]
    pub data: Option<BTreeMap<String, String>>,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
}

impl K8sObject {
    /// True when `status.conditions` holds `type_` with status `"True"`.
    #[must_use]
    pub fn condition_true(&self, type_: &str) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.conditions
                .iter()
                .any(|c| c.type_ == type_ && c.status == "True")
        })
    }

    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Label on the pod template of a workload (`spec.template.metadata.labels`).
    #[must_use]
    pub fn pod_template_label(&self, key: &str) -> Option<&str> {
        self.spec
            .as_ref()?
            .pointer("/template/metadata/labels")?
            .get(key)?
            .as_str()
    }

    /// `spec.selector.matchLabels` of a workload.
    #[must_use]
    pub fn match_labels(&self) -> BTreeMap<String, String> {
        self.spec
            .as_ref()
            .and_then(|spec| spec.pointer("/selector/matchLabels"))
            .and_then(|labels| serde_json::from_value(labels.clone()).ok())
            .unwrap_or_default()
    }

    /// True when the object is a Pod whose every container has env `name` set to `value`.
    #[must_use]
    pub fn env_in_all_containers(&self, name: &str, value: &str) -> bool {
        let Some(containers) = self
            .spec
            .as_ref()
            .and_then(|spec| spec.get("containers"))
            .and_then(|c| c.as_array())
        else {
            return false;
        };
        !containers.is_empty()
            && containers.iter().all(|container| {
                container
                    .get("env")
                    .and_then(|env| env.as_array())
                    .is_some_and(|env| {
                        env.iter().any(|var| {
                            var.get("name").and_then(|n| n.as_str()) == Some(name)
                                && var.get("value").and_then(|v| v.as_str()) == Some(value)
                        })
                    })
            })
    }

    /// First load-balancer ingress address (IP, else hostname) of a Service.
    #[must_use]
    pub fn load_balancer_address(&self) -> Option<&str> {
        let ingress = self.status.as_ref()?.load_balancer.as_ref()?.ingress.first()?;
        ingress
            .ip
            .as_deref()
            .or(ingress.hostname.as_deref())
            .filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub load_balancer: Option<LoadBalancerStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadBalancerStatus {
    #[serde(default)]
    pub ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadBalancerIngress {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

/// `kubectl get <kind> -o json` on a collection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct K8sList {
    #[serde(default)]
    pub items: Vec<K8sObject>,
}

impl K8sList {
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|i| i.metadata.name.clone()).collect()
    }
}

// ============================================================================
// Helm
// ============================================================================

/// `helm status <release> -o json`
#[derive(Debug, Clone, Deserialize)]
pub struct HelmReleaseInfo {
    pub name: String,
    #[serde(default)]
    pub version: u32,
    pub info: HelmStatusInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelmStatusInfo {
    pub status: String,
}

impl HelmReleaseInfo {
    /// Only a `deployed` release counts as installed; `failed` or `pending-*`
    /// releases are upgraded again.
    #[must_use]
    pub fn is_deployed(&self) -> bool {
        self.info.status == "deployed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_template_label_and_annotation() {
        let deployment: K8sObject = serde_json::from_str(
            r#"{
                "metadata": {"name": "provider-azure-network-a1", "annotations": {"team": "platform"}},
                "spec": {"template": {"metadata": {"labels": {"azure.workload.identity/use": "true"}}}}
            }"#,
        )
        .unwrap();
        assert_eq!(deployment.pod_template_label("azure.workload.identity/use"), Some("true"));
        assert_eq!(deployment.pod_template_label("app"), None);
        assert_eq!(deployment.annotation("team"), Some("platform"));
        assert_eq!(K8sObject::default().pod_template_label("app"), None);
    }

    #[test]
    fn test_selector_and_injected_env() {
        let deployment: K8sObject = serde_json::from_str(
            r#"{"metadata": {"name": "p"}, "spec": {"selector": {"matchLabels": {"pkg.crossplane.io/revision": "p-1"}}}}"#,
        )
        .unwrap();
        assert_eq!(deployment.match_labels()["pkg.crossplane.io/revision"], "p-1");
        assert!(K8sObject::default().match_labels().is_empty());

        let pod: K8sObject = serde_json::from_str(
            r#"{"metadata": {"name": "p-x"}, "spec": {"containers": [
                {"name": "package-runtime", "env": [{"name": "AZURE_CLIENT_ID", "value": "client-123"}]},
                {"name": "sidecar", "env": [{"name": "AZURE_CLIENT_ID", "value": "client-123"}, {"name": "X", "value": "1"}]}
            ]}}"#,
        )
        .unwrap();
        assert!(pod.env_in_all_containers("AZURE_CLIENT_ID", "client-123"));
        assert!(!pod.env_in_all_containers("AZURE_CLIENT_ID", "client-456"));

        let stale: K8sObject = serde_json::from_str(
            r#"{"metadata": {"name": "p-y"}, "spec": {"containers": [{"name": "package-runtime"}]}}"#,
        )
        .unwrap();
        assert!(!stale.env_in_all_containers("AZURE_CLIENT_ID", "client-123"));
    }

    #[test]
    fn test_managed_cluster_issuer() {
        let cluster: ManagedCluster = serde_json::from_str(
            r#"{
                "name": "gws-aks",
                "provisioningState": "Succeeded",
                "oidcIssuerProfile": {"enabled": true, "issuerUrl": "https://westeurope.oic.prod-aks.azure.com/tid/cid/"},
                "securityProfile": {"workloadIdentity": {"enabled": true}},
                "identityProfile": {"kubeletidentity": {"objectId": "kubelet-oid", "clientId": "kubelet-cid"}},
                "agentPoolProfiles": [{"count": 2}]
            }"#,
        )
        .unwrap();
        assert_eq!(
            cluster.oidc_issuer_url(),
            Some("https://westeurope.oic.prod-aks.azure.com/tid/cid/")
        );
        assert!(cluster.workload_identity_enabled());
        assert_eq!(cluster.kubelet_object_id(), Some("kubelet-oid"));

        let pending: ManagedCluster =
            serde_json::from_str(r#"{"name":"gws-aks","oidcIssuerProfile":{"enabled":true,"issuerUrl":null}}"#)
                .unwrap();
        assert_eq!(pending.oidc_issuer_url(), None);
    }

    #[test]
    fn test_k8s_conditions_and_lb() {
        let deployment: K8sObject = serde_json::from_str(
            r#"{"metadata":{"name":"crossplane"},"status":{"conditions":[
                {"type":"Progressing","status":"True"},
                {"type":"Available","status":"False","reason":"MinimumReplicasUnavailable"}
            ]}}"#,
        )
        .unwrap();
        assert!(deployment.condition_true("Progressing"));
        assert!(!deployment.condition_true("Available"));
        assert!(!deployment.condition_true("Healthy"));

        let svc: K8sObject = serde_json::from_str(
            r#"{"metadata":{"name":"ingress-nginx-controller"},"status":{"loadBalancer":{"ingress":[{"ip":"203.0.113.5"}]}}}"#,
        )
        .unwrap();
        assert_eq!(svc.load_balancer_address(), Some("203.0.113.5"));

        let pending: K8sObject =
            serde_json::from_str(r#"{"metadata":{"name":"x"},"status":{"loadBalancer":{}}}"#).unwrap();
        assert_eq!(pending.load_balancer_address(), None);
    }

    #[test]
    fn test_helm_status() {
        let release: HelmReleaseInfo = serde_json::from_str(
            r#"{"name":"argocd","version":3,"namespace":"argocd","info":{"status":"deployed"}}"#,
        )
        .unwrap();
        assert!(release.is_deployed());
        let failed: HelmReleaseInfo =
            serde_json::from_str(r#"{"name":"harbor","info":{"status":"failed"}}"#).unwrap();
        assert!(!failed.is_deployed());
    }
}
