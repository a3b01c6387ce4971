//! GitOps hand-off: Argo CD, the root Application, announced endpoints

use async_trait::async_trait;
use tracing::{info, warn};

use aksboot_cloud::HelmRelease;
use aksboot_stage_api::{Criticality, Precondition, Readiness, Stage, StageContext, StageId};
use aksboot_utils::BootstrapError;

use crate::announcer::EndpointAnnouncer;
use crate::cluster::{release_precondition, wait_available};

pub const ARGOCD_NAMESPACE: &str = "argocd";

/// Argo CD, the GitOps controller the run hands off to.
pub struct ArgoCd;

impl ArgoCd {
    fn release() -> HelmRelease {
        HelmRelease::new(
            "argocd",
            ARGOCD_NAMESPACE,
            ("argo", "https://argoproj.github.io/argo-helm"),
            "argo/argo-cd",
        )
        .set("configs.params.server\\.insecure", "true")
    }
}

#[async_trait]
impl Stage for ArgoCd {
    fn id(&self) -> StageId {
        StageId::Argocd
    }

    fn description(&self) -> &'static str {
        "Install Argo CD"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        release_precondition(ctx, &Self::release()).await
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        ctx.cloud.helm.install_if_absent(&Self::release()).await.map(drop)
    }

    async fn wait(&self, ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        wait_available(ctx, ARGOCD_NAMESPACE, &["argocd-server"]).await
    }
}

/// The root Application every other GitOps object hangs off.
pub struct RootApplication;

#[async_trait]
impl Stage for RootApplication {
    fn id(&self) -> StageId {
        StageId::RootApplication
    }

    fn description(&self) -> &'static str {
        "Apply the root Argo CD Application"
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let path = ctx.config.payload(&ctx.config.paths.root_application);
        let out = ctx.cloud.kubectl.apply_file(&path).await?;
        info!(path = %path, result = %out.trim(), "root application applied");
        Ok(())
    }
}

/// Publish `<service>.<ip>.nip.io` hostnames through the GitOps repository.
///
/// Runs only when the ingress got an address; without one there is nothing to announce.
pub struct EndpointAnnounce;

#[async_trait]
impl Stage for EndpointAnnounce {
    fn id(&self) -> StageId {
        StageId::EndpointAnnounce
    }

    fn description(&self) -> &'static str {
        "Commit nip.io hostnames for the ingress address and refresh Argo CD"
    }

    fn criticality(&self) -> Criticality {
        Criticality::BestEffort
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        let Some(address) = ctx.state.load_balancer_ip.get() else {
            return Ok(Precondition::Pending);
        };
        let announcer = EndpointAnnouncer::new(&ctx.cloud, &ctx.config);
        if announcer.is_announced(&address).await? {
            Ok(Precondition::satisfied(format!("hostnames for {address} already committed")))
        } else {
            Ok(Precondition::Pending)
        }
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let Some(address) = ctx.state.load_balancer_ip.get() else {
            warn!("no ingress address discovered, skipping endpoint announcement");
            return Ok(());
        };
        let announcement = EndpointAnnouncer::new(&ctx.cloud, &ctx.config)
            .announce(&address)
            .await?;
        for (service, host) in &announcement.hosts {
            info!(service = %service, host = %host, "endpoint");
        }
        Ok(())
    }

    async fn wait(&self, ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        Ok(Readiness::from_reached(
            ctx.state.load_balancer_ip.is_set(),
            "ingress address unknown; hostnames were not announced",
        ))
    }

    fn remediation(&self, ctx: &StageContext) -> Option<String> {
        Some(format!(
            "Once `kubectl -n ingress-nginx get svc ingress-nginx-controller` shows an external IP, \
             put <service>.<ip>.nip.io hostnames into {} and commit",
            ctx.config.paths.hosts_values
        ))
    }
}
