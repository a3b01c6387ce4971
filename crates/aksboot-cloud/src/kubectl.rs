//! `kubectl` wrapper
//!
//! Generated manifests are applied as JSON on stdin; repository payloads are
//! applied by path. Reads go through `-o json` and the models in [`crate::models`].

use camino::Utf8Path;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::TcpListener;
use tracing::debug;

use aksboot_runner::{BackgroundProcess, CommandSpec};
use aksboot_utils::BootstrapError;

use crate::exec::Exec;
use crate::models::{K8sList, K8sObject};

#[derive(Clone)]
pub struct Kubectl {
    exec: Exec,
}

fn kubectl() -> CommandSpec {
    CommandSpec::new("kubectl")
}

fn namespaced(cmd: CommandSpec, namespace: Option<&str>) -> CommandSpec {
    match namespace {
        Some(ns) => cmd.args(["--namespace", ns]),
        None => cmd,
    }
}

impl Kubectl {
    #[must_use]
    pub fn new(exec: Exec) -> Self {
        Self { exec }
    }

    /// Fetch one object; `Ok(None)` when it does not exist.
    pub async fn get(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<K8sObject>, BootstrapError> {
        let cmd = namespaced(kubectl().args(["get", kind, name]), namespace).args(["-o", "json"]);
        self.exec.probe_json(&cmd).await
    }

    pub async fn exists(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<bool, BootstrapError> {
        Ok(self.get(kind, name, namespace).await?.is_some())
    }

    pub async fn list(&self, kind: &str, namespace: Option<&str>) -> Result<K8sList, BootstrapError> {
        let cmd = namespaced(kubectl().args(["get", kind]), namespace).args(["-o", "json"]);
        self.exec.json(&cmd).await
    }

    /// Objects of `kind` in `namespace` carrying every label in `selector`.
    pub async fn list_selected(
        &self,
        kind: &str,
        namespace: Option<&str>,
        selector: &BTreeMap<String, String>,
    ) -> Result<K8sList, BootstrapError> {
        let selector = selector
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        let cmd = namespaced(kubectl().args(["get", kind]), namespace)
            .args(["-l", selector.as_str(), "-o", "json"]);
        self.exec.json(&cmd).await
    }

    /// Names of all objects of `kind` in `namespace`.
    pub async fn list_names(
        &self,
        kind: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<String>, BootstrapError> {
        Ok(self.list(kind, namespace).await?.names())
    }

    pub async fn create_namespace(&self, name: &str) -> Result<(), BootstrapError> {
        self.exec
            .run(&kubectl().args(["create", "namespace", name]))
            .await
            .map(drop)
    }

    /// `kubectl apply -f -` with `manifest` on stdin.
    ///
    /// Manifests carrying secrets go through here so they never reach argv or disk.
    pub async fn apply_json(&self, manifest: &Value) -> Result<String, BootstrapError> {
        let payload = serde_json::to_vec(manifest)
            .map_err(|e| BootstrapError::parse("generated manifest", e))?;
        self.exec
            .run(&kubectl().args(["apply", "-f", "-"]).stdin(payload))
            .await
    }

    /// Apply a manifest file from the repository.
    pub async fn apply_file(&self, path: &Utf8Path) -> Result<String, BootstrapError> {
        if !path.is_file() {
            return Err(BootstrapError::Manifest {
                path: path.to_string(),
                reason: "file does not exist".to_string(),
            });
        }
        self.exec
            .run(&kubectl().args(["apply", "-f", path.as_str()]))
            .await
    }

    pub async fn annotate(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        key: &str,
        value: &str,
    ) -> Result<(), BootstrapError> {
        let annotation = format!("{key}={value}");
        let cmd = namespaced(kubectl().args(["annotate", kind, name]), namespace)
            .args(["--overwrite", annotation.as_str()]);
        self.exec.run(&cmd).await.map(drop)
    }

    /// JSON merge patch.
    pub async fn patch_merge(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        patch: &Value,
    ) -> Result<(), BootstrapError> {
        let patch = patch.to_string();
        let cmd = namespaced(kubectl().args(["patch", kind, name]), namespace)
            .args(["--type", "merge", "-p", patch.as_str()]);
        self.exec.run(&cmd).await.map(drop)
    }

    pub async fn rollout_restart(&self, deployment: &str, namespace: &str) -> Result<(), BootstrapError> {
        let target = format!("deployment/{deployment}");
        self.exec
            .run(&kubectl().args(["rollout", "restart", target.as_str(), "--namespace", namespace]))
            .await
            .map(drop)
    }

    /// True when the object exists and reports condition `condition` as `"True"`.
    /// A missing object is "not yet", not an error.
    pub async fn condition_true(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        condition: &str,
    ) -> Result<bool, BootstrapError> {
        Ok(self
            .get(kind, name, namespace)
            .await?
            .is_some_and(|o| o.condition_true(condition)))
    }

    pub async fn deployment_available(&self, name: &str, namespace: &str) -> Result<bool, BootstrapError> {
        self.condition_true("deployment", name, Some(namespace), "Available")
            .await
    }

    /// Load-balancer address of a Service, once assigned.
    pub async fn service_address(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<String>, BootstrapError> {
        Ok(self
            .get("service", name, Some(namespace))
            .await?
            .and_then(|svc| svc.load_balancer_address().map(str::to_string)))
    }
}

// ============================================================================
// Port forwarding
// ============================================================================

/// An open tunnel to an in-cluster service. Dropping it closes the tunnel.
#[derive(Debug)]
pub struct PortForward {
    local_port: u16,
    _process: Option<BackgroundProcess>,
}

impl PortForward {
    /// A tunnel that is not owned by this process (already reachable, or a test).
    #[must_use]
    pub fn unmanaged(local_port: u16) -> Self {
        Self {
            local_port,
            _process: None,
        }
    }

    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    #[must_use]
    pub fn local_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.local_port)
    }
}

/// Opens tunnels to in-cluster services.
pub trait PortForwarder: Send + Sync {
    /// Forward a free local port to `remote_port` of `target` (`svc/<name>`).
    fn forward(
        &self,
        namespace: &str,
        target: &str,
        remote_port: u16,
    ) -> Result<PortForward, BootstrapError>;
}

/// `kubectl port-forward` running as a scoped background process.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubectlPortForwarder;

impl PortForwarder for KubectlPortForwarder {
    fn forward(
        &self,
        namespace: &str,
        target: &str,
        remote_port: u16,
    ) -> Result<PortForward, BootstrapError> {
        let local_port = free_local_port()?;
        let ports = format!("{local_port}:{remote_port}");
        let cmd = kubectl().args([
            "port-forward",
            "--namespace",
            namespace,
            "--address",
            "127.0.0.1",
            target,
            ports.as_str(),
        ]);
        let process = BackgroundProcess::spawn(&cmd)?;
        debug!(target = %target, local_port, "port-forward opened");
        Ok(PortForward {
            local_port,
            _process: Some(process),
        })
    }
}

fn free_local_port() -> Result<u16, BootstrapError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aksboot_runner::ProcessOutput;
    use aksboot_runner::test_support::ScriptedRunner;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn kubectl_with(runner: &Arc<ScriptedRunner>) -> Kubectl {
        Kubectl::new(Exec::new(runner.clone(), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_apply_json_uses_stdin() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&["kubectl", "apply"], ProcessOutput::ok("secret/db configured"));

        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "db"},
            "stringData": {"password": "s3cret"}
        });
        kubectl_with(&runner).apply_json(&manifest).await.unwrap();

        let spec = &runner.specs()[0];
        assert_eq!(spec.argv(), vec!["kubectl", "apply", "-f", "-"]);
        let stdin = String::from_utf8(spec.stdin.clone().unwrap()).unwrap();
        assert!(stdin.contains("s3cret"));
        assert!(!spec.display().contains("s3cret"));
    }

    #[tokio::test]
    async fn test_missing_object_is_not_available() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            &["kubectl", "get", "deployment"],
            ProcessOutput::failed(1, "Error from server (NotFound): deployments.apps \"crossplane\" not found"),
        );
        let available = kubectl_with(&runner)
            .deployment_available("crossplane", "crossplane-system")
            .await
            .unwrap();
        assert!(!available);
        assert_eq!(
            runner.calls()[0],
            vec![
                "kubectl", "get", "deployment", "crossplane", "--namespace",
                "crossplane-system", "-o", "json"
            ]
        );
    }

    #[tokio::test]
    async fn test_annotate_and_patch_argv() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&["kubectl"], ProcessOutput::ok(""));
        let k = kubectl_with(&runner);

        k.annotate(
            "serviceaccount",
            "provider-azure-network-5f3a",
            Some("crossplane-system"),
            "azure.workload.identity/client-id",
            "cid",
        )
        .await
        .unwrap();
        k.patch_merge(
            "deployment",
            "provider-azure-network-5f3a",
            Some("crossplane-system"),
            &json!({"spec": {"template": {"metadata": {"labels": {"azure.workload.identity/use": "true"}}}}}),
        )
        .await
        .unwrap();

        let calls = runner.calls();
        assert!(calls[0].contains(&"--overwrite".to_string()));
        assert!(calls[0].contains(&"azure.workload.identity/client-id=cid".to_string()));
        assert!(calls[1].contains(&"merge".to_string()));
    }

    #[tokio::test]
    async fn test_apply_file_rejects_missing_payload() {
        let runner = Arc::new(ScriptedRunner::new());
        let err = kubectl_with(&runner)
            .apply_file(Utf8Path::new("/nonexistent/xrd.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Manifest { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_unmanaged_port_forward_url() {
        let pf = PortForward::unmanaged(18080);
        assert_eq!(pf.local_url(), "http://127.0.0.1:18080");
    }
}
