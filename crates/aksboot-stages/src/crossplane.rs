//! Crossplane: controller, Azure providers, workload identity, composition
//!
//! Provider pods authenticate to Azure through the managed identity. That needs the
//! providers' service account names, which Crossplane generates, so the binding
//! stage discovers them by prefix before federating.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use aksboot_cloud::HelmRelease;
use aksboot_config::{CROSSPLANE_NAMESPACE, PROVIDER_PREFIX};
use aksboot_stage_api::{Criticality, Precondition, Readiness, Stage, StageContext, StageId};
use aksboot_utils::discovery::{DiscoveryRequest, NamePattern, discover_names};
use aksboot_utils::{BootstrapError, RetryPolicy, poll_until, retry_with_backoff};

use crate::cluster::{release_precondition, wait_available};
use crate::identity::IdentityBinder;
use crate::manifests::{
    PROVIDER_CONFIG_NAME, RUNTIME_CONFIG_NAME, encoded_secret, provider, provider_config,
    read_metadata, runtime_config,
};

const PROVIDER_KIND: &str = "provider.pkg.crossplane.io";
const RUNTIME_CONFIG_KIND: &str = "deploymentruntimeconfig.pkg.crossplane.io";
const PROVIDER_CONFIG_KIND: &str = "providerconfig.azure.upbound.io";
const XRD_KIND: &str = "compositeresourcedefinition.apiextensions.crossplane.io";

/// True for `kubectl apply` failures caused by a CRD that is not registered yet.
#[must_use]
pub fn is_crd_missing(err: &BootstrapError) -> bool {
    match err {
        BootstrapError::CommandFailed { stderr, .. } => [
            "no matches for kind",
            "ensure CRDs are installed first",
            "the server could not find the requested resource",
            "doesn't have a resource type",
        ]
        .iter()
        .any(|marker| stderr.contains(marker)),
        _ => false,
    }
}

pub struct Crossplane;

impl Crossplane {
    fn release() -> HelmRelease {
        HelmRelease::new(
            "crossplane",
            CROSSPLANE_NAMESPACE,
            ("crossplane-stable", "https://charts.crossplane.io/stable"),
            "crossplane-stable/crossplane",
        )
    }
}

#[async_trait]
impl Stage for Crossplane {
    fn id(&self) -> StageId {
        StageId::Crossplane
    }

    fn description(&self) -> &'static str {
        "Install Crossplane"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        release_precondition(ctx, &Self::release()).await
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        ctx.cloud.helm.install_if_absent(&Self::release()).await.map(drop)
    }

    async fn wait(&self, ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        wait_available(ctx, CROSSPLANE_NAMESPACE, &["crossplane", "crossplane-rbac-manager"]).await
    }
}

/// Azure provider packages, all sharing the workload identity runtime config.
pub struct CrossplaneProviders;

impl CrossplaneProviders {
    async fn healthy(ctx: &StageContext, name: &str) -> Result<bool, BootstrapError> {
        ctx.cloud
            .kubectl
            .condition_true(PROVIDER_KIND, name, None, "Healthy")
            .await
    }
}

#[async_trait]
impl Stage for CrossplaneProviders {
    fn id(&self) -> StageId {
        StageId::CrossplaneProviders
    }

    fn description(&self) -> &'static str {
        "Install the Azure providers and wait for them to become healthy"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        if !ctx
            .cloud
            .kubectl
            .exists(RUNTIME_CONFIG_KIND, RUNTIME_CONFIG_NAME, None)
            .await?
        {
            return Ok(Precondition::Pending);
        }
        for name in &ctx.config.providers {
            if !Self::healthy(ctx, name).await? {
                return Ok(Precondition::Pending);
            }
        }
        Ok(Precondition::satisfied(format!(
            "{} providers healthy",
            ctx.config.providers.len()
        )))
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let kubectl = &ctx.cloud.kubectl;
        kubectl.apply_json(&runtime_config()).await?;
        for name in &ctx.config.providers {
            let package = ctx.config.provider_package(name);
            kubectl.apply_json(&provider(name, &package)).await?;
            info!(provider = %name, package = %package, "provider applied");
        }
        Ok(())
    }

    async fn wait(&self, ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        let policy = ctx.policy(ctx.config.timeouts.provider_healthy_secs);
        let mut unhealthy = Vec::new();
        for name in &ctx.config.providers {
            let what = format!("provider {name} Healthy");
            let healthy = poll_until(policy, &what, move || async move {
                Ok::<_, BootstrapError>(Self::healthy(ctx, name).await?.then_some(()))
            })
            .await
            .or_warn(&what)?;
            if healthy.is_none() {
                unhealthy.push(name.as_str());
            }
        }
        Ok(Readiness::from_reached(
            unhealthy.is_empty(),
            format!("providers not healthy yet: {}", unhealthy.join(", ")),
        ))
    }
}

/// Federate every provider service account with the managed identity.
pub struct ProviderIdentities;

impl ProviderIdentities {
    fn pattern() -> NamePattern {
        NamePattern::prefix(PROVIDER_PREFIX)
    }

    async fn list(ctx: &StageContext) -> Result<Vec<String>, BootstrapError> {
        ctx.cloud
            .kubectl
            .list_names("serviceaccount", Some(CROSSPLANE_NAMESPACE))
            .await
    }

    fn record(ctx: &StageContext, accounts: Vec<String>) -> Result<(), BootstrapError> {
        ctx.state.provider_service_accounts.set(accounts)
    }
}

#[async_trait]
impl Stage for ProviderIdentities {
    fn id(&self) -> StageId {
        StageId::ProviderIdentities
    }

    fn description(&self) -> &'static str {
        "Discover provider service accounts and bind them to the managed identity"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        let accounts = Self::pattern().filter(Self::list(ctx).await?);
        if accounts.len() < ctx.config.expected_provider_accounts() {
            return Ok(Precondition::Pending);
        }

        let issuer = ctx.state.oidc_issuer_url.require()?;
        let client_id = ctx.state.identity_client_id.require()?;
        let binder = IdentityBinder::new(
            &ctx.cloud,
            &ctx.config.resource_group,
            &ctx.config.identity_name,
            &issuer,
            &client_id,
            CROSSPLANE_NAMESPACE,
        );
        for sa in &accounts {
            if !binder.is_bound(sa).await? {
                return Ok(Precondition::Pending);
            }
        }

        let reason = format!("{} service accounts already federated", accounts.len());
        Self::record(ctx, accounts)?;
        Ok(Precondition::satisfied(reason))
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let request = DiscoveryRequest {
            what: "provider service accounts".to_string(),
            pattern: Self::pattern(),
            min_count: ctx.config.expected_provider_accounts(),
            policy: ctx.policy(ctx.config.timeouts.discovery_secs),
        };
        let accounts = discover_names(&request, || Self::list(ctx)).await?;

        let issuer = ctx.state.oidc_issuer_url.require()?;
        let client_id = ctx.state.identity_client_id.require()?;
        let bindings = IdentityBinder::new(
            &ctx.cloud,
            &ctx.config.resource_group,
            &ctx.config.identity_name,
            &issuer,
            &client_id,
            CROSSPLANE_NAMESPACE,
        )
        .bind_all(&accounts)
        .await?;

        let restarted = bindings.iter().filter(|b| b.restarted).count();
        info!(accounts = bindings.len(), restarted, "provider identities bound");
        Self::record(ctx, accounts)
    }
}

/// The Azure `ProviderConfig` compositions authenticate with.
pub struct ProviderConfig;

impl ProviderConfig {
    fn manifest(ctx: &StageContext) -> Result<serde_json::Value, BootstrapError> {
        Ok(provider_config(
            &ctx.state.subscription_id.require()?,
            &ctx.state.tenant_id.require()?,
            &ctx.state.identity_client_id.require()?,
        ))
    }
}

#[async_trait]
impl Stage for ProviderConfig {
    fn id(&self) -> StageId {
        StageId::ProviderConfig
    }

    fn description(&self) -> &'static str {
        "Apply the Azure ProviderConfig using the workload identity"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        let client_id = ctx.state.identity_client_id.require()?;
        let current = ctx
            .cloud
            .kubectl
            .get(PROVIDER_CONFIG_KIND, PROVIDER_CONFIG_NAME, None)
            .await
            .or_else(|e| if is_crd_missing(&e) { Ok(None) } else { Err(e) })?;
        let matches = current
            .and_then(|pc| pc.spec)
            .is_some_and(|spec| spec["clientID"].as_str() == Some(client_id.as_str()));
        Ok(if matches {
            Precondition::satisfied(format!("ProviderConfig {PROVIDER_CONFIG_NAME} uses client {client_id}"))
        } else {
            Precondition::Pending
        })
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let manifest = Self::manifest(ctx)?;
        let interval = Duration::from_secs(ctx.config.timeouts.poll_interval_secs.max(1));
        let window = Duration::from_secs(ctx.config.timeouts.provider_config_secs);
        // the ProviderConfig CRD only appears once the family provider is installed
        retry_with_backoff(
            &RetryPolicy::fixed_within(interval, window),
            "apply ProviderConfig",
            is_crd_missing,
            || ctx.cloud.kubectl.apply_json(&manifest),
        )
        .await
        .map(drop)
    }
}

/// The composite resource definition and composition from the repository.
pub struct Composition;

#[async_trait]
impl Stage for Composition {
    fn id(&self) -> StageId {
        StageId::Composition
    }

    fn description(&self) -> &'static str {
        "Apply the database XRD and composition"
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let paths = &ctx.config.paths;
        for path in [&paths.xrd, &paths.composition] {
            let path = ctx.config.payload(path);
            let out = ctx.cloud.kubectl.apply_file(&path).await?;
            info!(path = %path, result = %out.trim(), "manifest applied");
        }
        Ok(())
    }

    async fn wait(&self, ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        let xrd = read_metadata(&ctx.config.payload(&ctx.config.paths.xrd))?.name;
        let what = format!("XRD {xrd} Established");
        let policy = ctx.policy(ctx.config.timeouts.xrd_established_secs);
        let established = poll_until(policy, &what, || {
            let xrd = xrd.as_str();
            async move {
                Ok::<_, BootstrapError>(
                    ctx.cloud
                        .kubectl
                        .condition_true(XRD_KIND, xrd, None, "Established")
                        .await?
                        .then_some(()),
                )
            }
        })
        .await
        .or_warn(&what)?;
        Ok(Readiness::from_reached(
            established.is_some(),
            format!("{what} not reached in time"),
        ))
    }
}

/// Copy the database connection secret Crossplane writes into the app namespace.
pub struct ConnectionSecret;

impl ConnectionSecret {
    async fn source(
        ctx: &StageContext,
    ) -> Result<Option<std::collections::BTreeMap<String, String>>, BootstrapError> {
        Ok(ctx
            .cloud
            .kubectl
            .get(
                "secret",
                &ctx.config.connection_secret_name,
                Some(&ctx.config.connection_secret_namespace),
            )
            .await?
            .and_then(|s| s.data))
    }
}

#[async_trait]
impl Stage for ConnectionSecret {
    fn id(&self) -> StageId {
        StageId::ConnectionSecret
    }

    fn description(&self) -> &'static str {
        "Copy the database connection secret into the application namespace"
    }

    fn criticality(&self) -> Criticality {
        Criticality::BestEffort
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        let config = &ctx.config;
        if config.connection_secret_namespace == config.app_namespace {
            return Ok(Precondition::satisfied("connection secret is written to the application namespace"));
        }
        let Some(source) = Self::source(ctx).await? else {
            return Ok(Precondition::Pending);
        };
        let copy = ctx
            .cloud
            .kubectl
            .get("secret", &config.connection_secret_name, Some(&config.app_namespace))
            .await?
            .and_then(|s| s.data);
        Ok(if copy.as_ref() == Some(&source) {
            Precondition::satisfied(format!(
                "{}/{} is current",
                config.app_namespace, config.connection_secret_name
            ))
        } else {
            Precondition::Pending
        })
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let config = &ctx.config;
        let what = format!(
            "connection secret {}/{}",
            config.connection_secret_namespace, config.connection_secret_name
        );
        let policy = ctx.policy(config.timeouts.connection_secret_secs);
        let data = poll_until(policy, &what, || Self::source(ctx))
            .await
            .or_fatal(&what)?;
        if data.is_empty() {
            warn!(secret = %config.connection_secret_name, "connection secret has no data");
        }
        ctx.cloud
            .kubectl
            .apply_json(&encoded_secret(&config.connection_secret_name, &config.app_namespace, &data))
            .await?;
        info!(
            secret = %config.connection_secret_name,
            from = %config.connection_secret_namespace,
            to = %config.app_namespace,
            keys = data.len(),
            "connection secret copied"
        );
        Ok(())
    }

    fn remediation(&self, ctx: &StageContext) -> Option<String> {
        let config = &ctx.config;
        Some(format!(
            "Once the database claim is ready, copy the secret: kubectl get secret {name} -n {from} -o json \
             | jq '.metadata = {{name: .metadata.name, namespace: \"{to}\"}}' | kubectl apply -f -",
            name = config.connection_secret_name,
            from = config.connection_secret_namespace,
            to = config.app_namespace,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crd_missing_detection() {
        let missing = BootstrapError::CommandFailed {
            command: "kubectl apply -f -".to_string(),
            exit_code: Some(1),
            stderr: "error: resource mapping not found for name: \"default\": no matches for kind \"ProviderConfig\" in version \"azure.upbound.io/v1beta1\"\nensure CRDs are installed first".to_string(),
        };
        assert!(is_crd_missing(&missing));

        let denied = BootstrapError::CommandFailed {
            command: "kubectl apply -f -".to_string(),
            exit_code: Some(1),
            stderr: "Error from server (Forbidden)".to_string(),
        };
        assert!(!is_crd_missing(&denied));
        assert!(!is_crd_missing(&BootstrapError::Interrupted));
    }
}
