//! Azure resources: preflight, resource group, cluster, registry, identity

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use aksboot_cloud::az::{AksCreate, is_principal_not_replicated};
use aksboot_cloud::ensure;
use aksboot_doctor::DoctorCommand;
use aksboot_stage_api::{Precondition, Readiness, Stage, StageContext, StageId};
use aksboot_utils::{BootstrapError, RetryPolicy, poll_until, retry_with_backoff};

/// Role the Crossplane identity needs on the resource group.
pub const IDENTITY_ROLE: &str = "Contributor";

/// Role the kubelet identity needs on the container registry.
pub const PULL_ROLE: &str = "AcrPull";

/// Required tools on `PATH`, then a usable `az` login.
pub struct Preflight;

#[async_trait]
impl Stage for Preflight {
    fn id(&self) -> StageId {
        StageId::Preflight
    }

    fn description(&self) -> &'static str {
        "Check required tools and the Azure login"
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let mut doctor = DoctorCommand::new(ctx.cloud.az.clone());
        if let Some(path) = &ctx.tool_search_path {
            doctor = doctor.with_search_path(path.clone());
        }
        let account = doctor.preflight().await?;
        ctx.state.subscription_id.set(account.id)?;
        ctx.state.tenant_id.set(account.tenant_id)?;
        Ok(())
    }
}

pub struct ResourceGroup;

#[async_trait]
impl Stage for ResourceGroup {
    fn id(&self) -> StageId {
        StageId::ResourceGroup
    }

    fn description(&self) -> &'static str {
        "Create the resource group"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        let name = &ctx.config.resource_group;
        Ok(match ctx.cloud.az.group_show(name).await? {
            Some(group) => Precondition::satisfied(format!(
                "resource group {} exists in {}",
                group.name, group.location
            )),
            None => Precondition::Pending,
        })
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let config = &ctx.config;
        let az = &ctx.cloud.az;
        ensure(
            &format!("resource group {}", config.resource_group),
            || az.group_show(&config.resource_group),
            || az.group_create(&config.resource_group, &config.location),
        )
        .await
        .map(drop)
    }
}

/// AKS with the OIDC issuer and workload identity enabled.
pub struct AksCluster;

#[async_trait]
impl Stage for AksCluster {
    fn id(&self) -> StageId {
        StageId::AksCluster
    }

    fn description(&self) -> &'static str {
        "Create the AKS cluster with OIDC issuer and workload identity"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        let config = &ctx.config;
        let Some(cluster) = ctx
            .cloud
            .az
            .aks_show(&config.resource_group, &config.cluster_name)
            .await?
        else {
            return Ok(Precondition::Pending);
        };
        if !cluster.federation_ready() {
            info!(
                cluster = %cluster.name,
                oidc_issuer = cluster.oidc_issuer_enabled(),
                workload_identity = cluster.workload_identity_enabled(),
                "cluster exists without workload identity"
            );
            return Ok(Precondition::Pending);
        }
        Ok(Precondition::satisfied(format!("cluster {} exists", cluster.name)))
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let config = &ctx.config;
        let az = &ctx.cloud.az;
        let spec = AksCreate {
            resource_group: &config.resource_group,
            name: &config.cluster_name,
            location: &config.location,
            kubernetes_version: &config.kubernetes_version,
            node_count: config.node_count,
            node_vm_size: &config.node_vm_size,
        };
        let cluster = ensure(
            &format!("AKS cluster {}", config.cluster_name),
            || az.aks_show(&config.resource_group, &config.cluster_name),
            || az.aks_create(&spec),
        )
        .await?
        .into_inner();

        if !cluster.federation_ready() {
            info!(cluster = %cluster.name, "enabling OIDC issuer and workload identity");
            az.aks_enable_workload_identity(&config.resource_group, &config.cluster_name)
                .await?;
        }
        Ok(())
    }
}

/// Merge the cluster into the local kubeconfig.
pub struct ClusterCredentials;

#[async_trait]
impl Stage for ClusterCredentials {
    fn id(&self) -> StageId {
        StageId::ClusterCredentials
    }

    fn description(&self) -> &'static str {
        "Fetch cluster credentials into the kubeconfig"
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        ctx.cloud
            .az
            .aks_get_credentials(&ctx.config.resource_group, &ctx.config.cluster_name)
            .await
    }
}

/// Wait for the cluster's OIDC issuer URL. Federation cannot proceed without it.
pub struct OidcIssuer;

impl OidcIssuer {
    async fn issuer(ctx: &StageContext) -> Result<Option<String>, BootstrapError> {
        Ok(ctx
            .cloud
            .az
            .aks_show(&ctx.config.resource_group, &ctx.config.cluster_name)
            .await?
            .and_then(|c| c.oidc_issuer_url().map(str::to_string)))
    }
}

#[async_trait]
impl Stage for OidcIssuer {
    fn id(&self) -> StageId {
        StageId::OidcIssuer
    }

    fn description(&self) -> &'static str {
        "Discover the cluster OIDC issuer URL"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        Ok(match Self::issuer(ctx).await? {
            Some(url) => Precondition::satisfied(format!("issuer published at {url}")),
            None => Precondition::Pending,
        })
    }

    /// Wait-only: aks-cluster enables the issuer, this stage reads what it published.
    async fn apply(&self, _ctx: &StageContext) -> Result<(), BootstrapError> {
        Ok(())
    }

    async fn wait(&self, ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        let policy = ctx.policy(ctx.config.timeouts.oidc_issuer_secs);
        let url = poll_until(policy, "OIDC issuer URL", || Self::issuer(ctx))
            .await
            .or_fatal("OIDC issuer URL")?;
        info!(issuer = %url, "OIDC issuer discovered");
        ctx.state.oidc_issuer_url.set(url)?;
        Ok(Readiness::Ready)
    }
}

/// ACR, attached to the cluster so nodes can pull from it.
pub struct ContainerRegistry;

impl ContainerRegistry {
    /// Whether the kubelet identity holds `AcrPull` on the registry.
    async fn attached(ctx: &StageContext, registry_id: &str) -> Result<bool, BootstrapError> {
        let config = &ctx.config;
        let az = &ctx.cloud.az;
        let Some(cluster) = az.aks_show(&config.resource_group, &config.cluster_name).await? else {
            return Ok(false);
        };
        match cluster.kubelet_object_id() {
            Some(kubelet) => az.has_role(kubelet, PULL_ROLE, registry_id).await,
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Stage for ContainerRegistry {
    fn id(&self) -> StageId {
        StageId::ContainerRegistry
    }

    fn description(&self) -> &'static str {
        "Create the container registry and attach it to the cluster"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        let config = &ctx.config;
        let Some(acr) = ctx.cloud.az.acr_show(&config.resource_group, &config.acr_name).await? else {
            return Ok(Precondition::Pending);
        };
        if Self::attached(ctx, &acr.id).await? {
            Ok(Precondition::satisfied(format!(
                "registry {} exists and is attached",
                acr.login_server
            )))
        } else {
            Ok(Precondition::Pending)
        }
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let config = &ctx.config;
        let az = &ctx.cloud.az;
        let acr = ensure(
            &format!("container registry {}", config.acr_name),
            || az.acr_show(&config.resource_group, &config.acr_name),
            || az.acr_create(&config.resource_group, &config.acr_name, &config.location),
        )
        .await?
        .into_inner();

        if !Self::attached(ctx, &acr.id).await? {
            info!(registry = %acr.name, cluster = %config.cluster_name, "attaching registry to cluster");
            az.aks_attach_acr(&config.resource_group, &config.cluster_name, &config.acr_name)
                .await?;
        }
        Ok(())
    }

    async fn wait(&self, ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        let acr = ctx
            .cloud
            .az
            .acr_show(&ctx.config.resource_group, &ctx.config.acr_name)
            .await?
            .ok_or_else(|| BootstrapError::Undiscovered {
                field: "acr_login_server".to_string(),
            })?;
        ctx.state.acr_login_server.set(acr.login_server)?;
        Ok(Readiness::Ready)
    }
}

/// User-assigned identity Crossplane providers federate with, plus its role.
pub struct ManagedIdentity;

impl ManagedIdentity {
    async fn scope(ctx: &StageContext) -> Result<String, BootstrapError> {
        ctx.cloud
            .az
            .group_show(&ctx.config.resource_group)
            .await?
            .map(|g| g.id)
            .ok_or_else(|| BootstrapError::Undiscovered {
                field: "resource group id".to_string(),
            })
    }
}

#[async_trait]
impl Stage for ManagedIdentity {
    fn id(&self) -> StageId {
        StageId::ManagedIdentity
    }

    fn description(&self) -> &'static str {
        "Create the managed identity and grant it Contributor on the resource group"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        let config = &ctx.config;
        let Some(identity) = ctx
            .cloud
            .az
            .identity_show(&config.resource_group, &config.identity_name)
            .await?
        else {
            return Ok(Precondition::Pending);
        };
        let scope = Self::scope(ctx).await?;
        if ctx.cloud.az.has_role(&identity.principal_id, IDENTITY_ROLE, &scope).await? {
            Ok(Precondition::satisfied(format!(
                "identity {} exists with {IDENTITY_ROLE}",
                identity.name
            )))
        } else {
            Ok(Precondition::Pending)
        }
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let config = &ctx.config;
        let az = &ctx.cloud.az;
        let identity = ensure(
            &format!("managed identity {}", config.identity_name),
            || az.identity_show(&config.resource_group, &config.identity_name),
            || az.identity_create(&config.resource_group, &config.identity_name, &config.location),
        )
        .await?
        .into_inner();

        let scope = Self::scope(ctx).await?;
        if az.has_role(&identity.principal_id, IDENTITY_ROLE, &scope).await? {
            return Ok(());
        }

        // a fresh principal takes a while to replicate through the directory
        let policy = RetryPolicy::fixed_within(
            Duration::from_secs(ctx.config.timeouts.poll_interval_secs.max(1) * 2),
            Duration::from_secs(120),
        );
        retry_with_backoff(
            &policy,
            "role assignment",
            is_principal_not_replicated,
            || az.role_assignment_create(&identity.principal_id, IDENTITY_ROLE, &scope),
        )
        .await
    }

    async fn wait(&self, ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        let identity = ctx
            .cloud
            .az
            .identity_show(&ctx.config.resource_group, &ctx.config.identity_name)
            .await?
            .ok_or_else(|| BootstrapError::Undiscovered {
                field: "identity_client_id".to_string(),
            })?;
        ctx.state.identity_client_id.set(identity.client_id)?;
        ctx.state.identity_principal_id.set(identity.principal_id)?;
        Ok(Readiness::Ready)
    }
}
