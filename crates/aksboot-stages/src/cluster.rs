//! In-cluster prerequisites: namespaces and Helm-installed controllers

use async_trait::async_trait;
use tracing::info;

use aksboot_cloud::{HelmRelease, ensure};
use aksboot_config::CROSSPLANE_NAMESPACE;
use aksboot_stage_api::{Precondition, Readiness, Stage, StageContext, StageId};
use aksboot_utils::{BootstrapError, poll_until};

use crate::gitops::ARGOCD_NAMESPACE;

pub const INGRESS_NAMESPACE: &str = "ingress-nginx";
pub const HARBOR_NAMESPACE: &str = "harbor";

const INGRESS_CONTROLLER: &str = "ingress-nginx-controller";

/// Namespaces the platform needs, the application namespace last.
#[must_use]
pub fn required_namespaces(app_namespace: &str) -> Vec<String> {
    let mut namespaces: Vec<String> = [ARGOCD_NAMESPACE, CROSSPLANE_NAMESPACE, INGRESS_NAMESPACE, HARBOR_NAMESPACE]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    if !namespaces.iter().any(|n| n == app_namespace) {
        namespaces.push(app_namespace.to_string());
    }
    namespaces
}

/// Poll until every deployment reports `Available`.
///
/// A timeout degrades the stage instead of failing it.
pub(crate) async fn wait_available(
    ctx: &StageContext,
    namespace: &str,
    deployments: &[&str],
) -> Result<Readiness, BootstrapError> {
    let policy = ctx.policy(ctx.config.timeouts.deployment_secs);
    for deployment in deployments {
        let what = format!("deployment {namespace}/{deployment} Available");
        let available = poll_until(policy, &what, move || async move {
            Ok::<_, BootstrapError>(
                ctx.cloud
                    .kubectl
                    .deployment_available(deployment, namespace)
                    .await?
                    .then_some(()),
            )
        })
        .await
        .or_warn(&what)?;
        if available.is_none() {
            return Ok(Readiness::degraded(format!("{what} not reached in time")));
        }
    }
    Ok(Readiness::Ready)
}

/// Satisfied when the release is deployed.
pub(crate) async fn release_precondition(
    ctx: &StageContext,
    release: &HelmRelease,
) -> Result<Precondition, BootstrapError> {
    if ctx.cloud.helm.is_deployed(&release.name, &release.namespace).await? {
        Ok(Precondition::satisfied(format!(
            "release {}/{} deployed",
            release.namespace, release.name
        )))
    } else {
        Ok(Precondition::Pending)
    }
}

pub struct Namespaces;

#[async_trait]
impl Stage for Namespaces {
    fn id(&self) -> StageId {
        StageId::Namespaces
    }

    fn description(&self) -> &'static str {
        "Create platform and application namespaces"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        for ns in required_namespaces(&ctx.config.app_namespace) {
            if !ctx.cloud.kubectl.exists("namespace", &ns, None).await? {
                return Ok(Precondition::Pending);
            }
        }
        Ok(Precondition::satisfied("all namespaces exist"))
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let kubectl = &ctx.cloud.kubectl;
        for ns in required_namespaces(&ctx.config.app_namespace) {
            ensure(
                &format!("namespace {ns}"),
                || async { Ok::<_, BootstrapError>(kubectl.exists("namespace", &ns, None).await?.then_some(())) },
                || kubectl.create_namespace(&ns),
            )
            .await?;
        }
        Ok(())
    }
}

/// ingress-nginx behind an Azure load balancer.
pub struct IngressController;

impl IngressController {
    fn release() -> HelmRelease {
        HelmRelease::new(
            "ingress-nginx",
            INGRESS_NAMESPACE,
            ("ingress-nginx", "https://kubernetes.github.io/ingress-nginx"),
            "ingress-nginx/ingress-nginx",
        )
        .set(
            "controller.service.annotations.service\\.beta\\.kubernetes\\.io/azure-load-balancer-health-probe-request-path",
            "/healthz",
        )
    }
}

#[async_trait]
impl Stage for IngressController {
    fn id(&self) -> StageId {
        StageId::IngressController
    }

    fn description(&self) -> &'static str {
        "Install ingress-nginx and discover its load-balancer address"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        release_precondition(ctx, &Self::release()).await
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        ctx.cloud.helm.install_if_absent(&Self::release()).await.map(drop)
    }

    async fn wait(&self, ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        if let Readiness::Degraded { warning } =
            wait_available(ctx, INGRESS_NAMESPACE, &[INGRESS_CONTROLLER]).await?
        {
            return Ok(Readiness::Degraded { warning });
        }

        let policy = ctx.policy(ctx.config.timeouts.load_balancer_ip_secs);
        let address = poll_until(policy, "ingress load-balancer address", move || {
            ctx.cloud.kubectl.service_address(INGRESS_CONTROLLER, INGRESS_NAMESPACE)
        })
        .await
        .or_warn("ingress load-balancer address")?;

        match address {
            Some(ip) => {
                info!(address = %ip, "ingress load-balancer address assigned");
                ctx.state.load_balancer_ip.set(ip)?;
                Ok(Readiness::Ready)
            }
            None => Ok(Readiness::degraded(
                "ingress load balancer has no address yet; hostnames will not be announced",
            )),
        }
    }
}
