//! `az` CLI wrapper
//!
//! Lookups return `Ok(None)` when Azure reports the resource missing; creates return
//! the created resource as Azure describes it.

use aksboot_runner::CommandSpec;
use aksboot_utils::BootstrapError;
use aksboot_utils::error::is_already_exists_output;

use crate::exec::{Exec, command_failed};
use crate::models::{
    AccountInfo, ContainerRegistry, FederatedCredential, ManagedCluster, ManagedIdentity,
    ResourceGroup, RoleAssignment,
};

/// Audience of every workload-identity federated credential.
pub const TOKEN_EXCHANGE_AUDIENCE: &str = "api://AzureADTokenExchange";

/// Parameters of `az aks create`.
#[derive(Debug, Clone)]
pub struct AksCreate<'a> {
    pub resource_group: &'a str,
    pub name: &'a str,
    pub location: &'a str,
    pub kubernetes_version: &'a str,
    pub node_count: u32,
    pub node_vm_size: &'a str,
}

/// Federated credential trusting one Kubernetes service account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedCredentialSpec {
    pub name: String,
    pub issuer: String,
    pub subject: String,
    pub audience: String,
}

impl FederatedCredentialSpec {
    /// Credential named after the service account, trusting
    /// `system:serviceaccount:<namespace>:<service_account>` tokens from `issuer`.
    #[must_use]
    pub fn for_service_account(issuer: &str, namespace: &str, service_account: &str) -> Self {
        Self {
            name: service_account.to_string(),
            issuer: issuer.to_string(),
            subject: format!("system:serviceaccount:{namespace}:{service_account}"),
            audience: TOKEN_EXCHANGE_AUDIENCE.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Az {
    exec: Exec,
}

fn az() -> CommandSpec {
    CommandSpec::new("az")
}

impl Az {
    #[must_use]
    pub fn new(exec: Exec) -> Self {
        Self { exec }
    }

    /// Current login. Any failure means there is no usable session.
    pub async fn account_show(&self) -> Result<AccountInfo, BootstrapError> {
        let cmd = az().args(["account", "show", "-o", "json"]);
        let output = self.exec.output(&cmd).await?;
        if !output.success() {
            let stderr = output.stderr_string();
            return Err(BootstrapError::NotAuthenticated {
                reason: first_line(&stderr).unwrap_or("az account show failed").to_string(),
            });
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| BootstrapError::parse("output of `az account show`", e))
    }

    pub async fn group_show(&self, name: &str) -> Result<Option<ResourceGroup>, BootstrapError> {
        self.exec
            .probe_json(&az().args(["group", "show", "--name", name, "-o", "json"]))
            .await
    }

    pub async fn group_create(
        &self,
        name: &str,
        location: &str,
    ) -> Result<ResourceGroup, BootstrapError> {
        self.exec
            .json(&az().args([
                "group", "create", "--name", name, "--location", location, "-o", "json",
            ]))
            .await
    }

    pub async fn aks_show(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<ManagedCluster>, BootstrapError> {
        self.exec
            .probe_json(&az().args([
                "aks",
                "show",
                "--resource-group",
                resource_group,
                "--name",
                name,
                "-o",
                "json",
            ]))
            .await
    }

    /// Create a cluster with the OIDC issuer and workload identity enabled.
    pub async fn aks_create(&self, spec: &AksCreate<'_>) -> Result<ManagedCluster, BootstrapError> {
        let node_count = spec.node_count.to_string();
        self.exec
            .json(&az().args([
                "aks",
                "create",
                "--resource-group",
                spec.resource_group,
                "--name",
                spec.name,
                "--location",
                spec.location,
                "--kubernetes-version",
                spec.kubernetes_version,
                "--node-count",
                node_count.as_str(),
                "--node-vm-size",
                spec.node_vm_size,
                "--enable-managed-identity",
                "--enable-oidc-issuer",
                "--enable-workload-identity",
                "--generate-ssh-keys",
                "-o",
                "json",
            ]))
            .await
    }

    /// Turn on the OIDC issuer and workload identity on an existing cluster.
    pub async fn aks_enable_workload_identity(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<ManagedCluster, BootstrapError> {
        self.exec
            .json(&az().args([
                "aks",
                "update",
                "--resource-group",
                resource_group,
                "--name",
                name,
                "--enable-oidc-issuer",
                "--enable-workload-identity",
                "-o",
                "json",
            ]))
            .await
    }

    /// Merge the cluster's credentials into the local kubeconfig.
    pub async fn aks_get_credentials(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<(), BootstrapError> {
        self.exec
            .run(&az().args([
                "aks",
                "get-credentials",
                "--resource-group",
                resource_group,
                "--name",
                name,
                "--overwrite-existing",
            ]))
            .await
            .map(drop)
    }

    /// Grant the cluster's kubelet identity `AcrPull` on the registry.
    pub async fn aks_attach_acr(
        &self,
        resource_group: &str,
        name: &str,
        acr_name: &str,
    ) -> Result<(), BootstrapError> {
        self.exec
            .run(&az().args([
                "aks",
                "update",
                "--resource-group",
                resource_group,
                "--name",
                name,
                "--attach-acr",
                acr_name,
                "-o",
                "none",
            ]))
            .await
            .map(drop)
    }

    pub async fn acr_show(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<ContainerRegistry>, BootstrapError> {
        self.exec
            .probe_json(&az().args([
                "acr",
                "show",
                "--resource-group",
                resource_group,
                "--name",
                name,
                "-o",
                "json",
            ]))
            .await
    }

    pub async fn acr_create(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<ContainerRegistry, BootstrapError> {
        self.exec
            .json(&az().args([
                "acr",
                "create",
                "--resource-group",
                resource_group,
                "--name",
                name,
                "--location",
                location,
                "--sku",
                "Basic",
                "-o",
                "json",
            ]))
            .await
    }

    /// Build `image` from `context_dir` inside the registry (`az acr build`).
    pub async fn acr_build(
        &self,
        registry: &str,
        image: &str,
        context_dir: &str,
    ) -> Result<(), BootstrapError> {
        self.exec
            .run(&az().args([
                "acr",
                "build",
                "--registry",
                registry,
                "--image",
                image,
                context_dir,
            ]))
            .await
            .map(drop)
    }

    pub async fn identity_show(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<ManagedIdentity>, BootstrapError> {
        self.exec
            .probe_json(&az().args([
                "identity",
                "show",
                "--resource-group",
                resource_group,
                "--name",
                name,
                "-o",
                "json",
            ]))
            .await
    }

    pub async fn identity_create(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<ManagedIdentity, BootstrapError> {
        self.exec
            .json(&az().args([
                "identity",
                "create",
                "--resource-group",
                resource_group,
                "--name",
                name,
                "--location",
                location,
                "-o",
                "json",
            ]))
            .await
    }

    /// Role assignments of `principal_id` at exactly `scope`.
    pub async fn role_assignments(
        &self,
        principal_id: &str,
        scope: &str,
    ) -> Result<Vec<RoleAssignment>, BootstrapError> {
        self.exec
            .json(&az().args([
                "role",
                "assignment",
                "list",
                "--assignee",
                principal_id,
                "--scope",
                scope,
                "-o",
                "json",
            ]))
            .await
    }

    /// Whether `principal_id` holds `role` at `scope`.
    pub async fn has_role(
        &self,
        principal_id: &str,
        role: &str,
        scope: &str,
    ) -> Result<bool, BootstrapError> {
        Ok(self
            .role_assignments(principal_id, scope)
            .await?
            .iter()
            .any(|a| a.role_definition_name.eq_ignore_ascii_case(role)))
    }

    pub async fn role_assignment_create(
        &self,
        principal_id: &str,
        role: &str,
        scope: &str,
    ) -> Result<(), BootstrapError> {
        self.exec
            .run(&az().args([
                "role",
                "assignment",
                "create",
                "--assignee-object-id",
                principal_id,
                "--assignee-principal-type",
                "ServicePrincipal",
                "--role",
                role,
                "--scope",
                scope,
                "-o",
                "none",
            ]))
            .await
            .map(drop)
    }

    pub async fn federated_credential_show(
        &self,
        resource_group: &str,
        identity_name: &str,
        name: &str,
    ) -> Result<Option<FederatedCredential>, BootstrapError> {
        self.exec
            .probe_json(&az().args([
                "identity",
                "federated-credential",
                "show",
                "--resource-group",
                resource_group,
                "--identity-name",
                identity_name,
                "--name",
                name,
                "-o",
                "json",
            ]))
            .await
    }

    /// Create a federated credential. An "already exists" answer counts as success.
    pub async fn federated_credential_create(
        &self,
        resource_group: &str,
        identity_name: &str,
        spec: &FederatedCredentialSpec,
    ) -> Result<(), BootstrapError> {
        let cmd = az().args([
            "identity",
            "federated-credential",
            "create",
            "--resource-group",
            resource_group,
            "--identity-name",
            identity_name,
            "--name",
            spec.name.as_str(),
            "--issuer",
            spec.issuer.as_str(),
            "--subject",
            spec.subject.as_str(),
            "--audiences",
            spec.audience.as_str(),
            "-o",
            "none",
        ]);
        let output = self.exec.output(&cmd).await?;
        if output.success() || is_already_exists_output(&output.stderr_string()) {
            Ok(())
        } else {
            Err(command_failed(&cmd, &output))
        }
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Error markers `az role assignment create` prints while a new principal is
/// still replicating through Entra ID.
#[must_use]
pub fn is_principal_not_replicated(err: &BootstrapError) -> bool {
    match err {
        BootstrapError::CommandFailed { stderr, .. } => {
            stderr.contains("PrincipalNotFound") || stderr.contains("does not exist in the directory")
        }
        _ => false,
    }
}
