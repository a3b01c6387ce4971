//! Generated Kubernetes manifests
//!
//! Everything the bootstrap applies that is not a repository file is built here as
//! a JSON value and piped to `kubectl apply -f -`.

use camino::Utf8Path;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use aksboot_utils::BootstrapError;

/// Pod label that makes the workload identity webhook project a token.
pub const WORKLOAD_IDENTITY_USE_LABEL: &str = "azure.workload.identity/use";

/// Service account annotation naming the federated managed identity.
pub const WORKLOAD_IDENTITY_CLIENT_ID: &str = "azure.workload.identity/client-id";

/// Env var the webhook injects into labelled pods of an annotated service account.
pub const WORKLOAD_IDENTITY_CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";

/// Runtime config every Azure provider references.
pub const RUNTIME_CONFIG_NAME: &str = "azure-workload-identity";

/// Name of the Azure `ProviderConfig` compositions use by default.
pub const PROVIDER_CONFIG_NAME: &str = "default";

/// `DeploymentRuntimeConfig` putting the workload identity label on provider pods.
#[must_use]
pub fn runtime_config() -> Value {
    json!({
        "apiVersion": "pkg.crossplane.io/v1beta1",
        "kind": "DeploymentRuntimeConfig",
        "metadata": { "name": RUNTIME_CONFIG_NAME },
        "spec": {
            "deploymentTemplate": {
                "spec": {
                    "selector": {},
                    "template": {
                        "metadata": {
                            "labels": { "azure.workload.identity/use": "true" }
                        },
                        "spec": {
                            "containers": [{ "name": "package-runtime" }]
                        }
                    }
                }
            }
        }
    })
}

/// Crossplane `Provider` package installation.
#[must_use]
pub fn provider(name: &str, package: &str) -> Value {
    json!({
        "apiVersion": "pkg.crossplane.io/v1",
        "kind": "Provider",
        "metadata": { "name": name },
        "spec": {
            "package": package,
            "runtimeConfigRef": { "name": RUNTIME_CONFIG_NAME }
        }
    })
}

/// Azure `ProviderConfig` authenticating through the projected OIDC token.
#[must_use]
pub fn provider_config(subscription_id: &str, tenant_id: &str, client_id: &str) -> Value {
    json!({
        "apiVersion": "azure.upbound.io/v1beta1",
        "kind": "ProviderConfig",
        "metadata": { "name": PROVIDER_CONFIG_NAME },
        "spec": {
            "credentials": { "source": "OIDCTokenFile" },
            "subscriptionID": subscription_id,
            "tenantID": tenant_id,
            "clientID": client_id
        }
    })
}

/// Opaque Secret from plain-text values.
#[must_use]
pub fn opaque_secret(name: &str, namespace: &str, string_data: &BTreeMap<String, String>) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": namespace },
        "type": "Opaque",
        "stringData": string_data
    })
}

/// Secret with already base64-encoded `data`, as read from another Secret.
#[must_use]
pub fn encoded_secret(name: &str, namespace: &str, data: &BTreeMap<String, String>) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": namespace },
        "type": "Opaque",
        "data": data
    })
}

/// Merge patch setting the workload identity label on a deployment's pod template.
#[must_use]
pub fn pod_template_label_patch() -> Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "labels": { "azure.workload.identity/use": "true" }
                }
            }
        }
    })
}

/// `metadata` of a repository manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestMeta {
    pub name: String,
    pub namespace: Option<String>,
}

/// Read `metadata.name` and `metadata.namespace` of a single-document YAML manifest.
pub fn read_metadata(path: &Utf8Path) -> Result<ManifestMeta, BootstrapError> {
    let manifest_error = |reason: String| BootstrapError::Manifest {
        path: path.to_string(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|e| manifest_error(e.to_string()))?;
    let name = doc["metadata"]["name"]
        .as_str()
        .ok_or_else(|| manifest_error("metadata.name is missing".to_string()))?;
    Ok(ManifestMeta {
        name: name.to_string(),
        namespace: doc["metadata"]["namespace"].as_str().map(str::to_string),
    })
}
