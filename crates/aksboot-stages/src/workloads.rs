//! Application-side prerequisites: database secret, dashboard image, Harbor

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::info;

use aksboot_cloud::HelmRelease;
use aksboot_config::{CROSSPLANE_NAMESPACE, SecretString};
use aksboot_registry::{RegistryBootstrapper, RegistryPlan};
use aksboot_stage_api::{Criticality, Precondition, Readiness, Stage, StageContext, StageId};
use aksboot_utils::BootstrapError;

use crate::cluster::{HARBOR_NAMESPACE, wait_available};
use crate::manifests::opaque_secret;

/// Secret the database composition reads the admin password from.
pub const DB_SECRET_NAME: &str = "gws-db-admin";
pub const DB_SECRET_KEY: &str = "password";

/// Image the dashboard is built as inside the registry.
pub const DASHBOARD_IMAGE: &str = "gws-dashboard:latest";

const HARBOR_CORE: &str = "harbor-core";

/// Database admin password, written once.
///
/// Taken from `DB_ADMIN_PASSWORD` when set, prompted for otherwise. An existing
/// secret is never overwritten, so re-runs do not prompt.
pub struct DatabaseSecret;

impl DatabaseSecret {
    async fn password(ctx: &StageContext) -> Result<SecretString, BootstrapError> {
        if let Some(password) = &ctx.config.db_admin_password {
            return Ok(password.clone());
        }
        let prompt = ctx.prompt.clone();
        tokio::task::spawn_blocking(move || prompt.read_secret("Database admin password"))
            .await
            .map_err(|e| BootstrapError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl Stage for DatabaseSecret {
    fn id(&self) -> StageId {
        StageId::DatabaseSecret
    }

    fn description(&self) -> &'static str {
        "Store the database admin password as a secret"
    }

    async fn check(&self, ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        Ok(
            if ctx
                .cloud
                .kubectl
                .exists("secret", DB_SECRET_NAME, Some(CROSSPLANE_NAMESPACE))
                .await?
            {
                Precondition::satisfied(format!("secret {CROSSPLANE_NAMESPACE}/{DB_SECRET_NAME} exists"))
            } else {
                Precondition::Pending
            },
        )
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let password = Self::password(ctx).await?;
        if password.is_empty() {
            return Err(BootstrapError::MissingInput {
                what: "database admin password (DB_ADMIN_PASSWORD)".to_string(),
            });
        }
        let data = BTreeMap::from([(DB_SECRET_KEY.to_string(), password.expose().to_string())]);
        ctx.cloud
            .kubectl
            .apply_json(&opaque_secret(DB_SECRET_NAME, CROSSPLANE_NAMESPACE, &data))
            .await?;
        info!(secret = %DB_SECRET_NAME, namespace = %CROSSPLANE_NAMESPACE, "database admin secret stored");
        Ok(())
    }
}

/// Dashboard image, built remotely by the registry from the repository sources.
pub struct DashboardImage;

#[async_trait]
impl Stage for DashboardImage {
    fn id(&self) -> StageId {
        StageId::DashboardImage
    }

    fn description(&self) -> &'static str {
        "Build the dashboard image in the container registry"
    }

    fn criticality(&self) -> Criticality {
        Criticality::BestEffort
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        let context_dir = ctx.config.payload(&ctx.config.paths.dashboard_dir);
        if !context_dir.is_dir() {
            return Err(BootstrapError::Manifest {
                path: context_dir.to_string(),
                reason: "dashboard build context does not exist".to_string(),
            });
        }
        ctx.cloud
            .az
            .acr_build(&ctx.config.acr_name, DASHBOARD_IMAGE, context_dir.as_str())
            .await?;
        info!(registry = %ctx.config.acr_name, image = %DASHBOARD_IMAGE, "dashboard image built");
        Ok(())
    }

    fn remediation(&self, ctx: &StageContext) -> Option<String> {
        Some(format!(
            "az acr build --registry {} --image {DASHBOARD_IMAGE} {}",
            ctx.config.acr_name,
            ctx.config.payload(&ctx.config.paths.dashboard_dir)
        ))
    }
}

/// Harbor, with a Docker Hub proxy cache and a private project for the application.
///
/// The Harbor objects are reconciled on every run; that only reads when they exist.
pub struct Harbor;

impl Harbor {
    fn release(ctx: &StageContext) -> HelmRelease {
        let external_url = match ctx.state.load_balancer_ip.get() {
            Some(ip) => format!("http://harbor.{ip}.nip.io"),
            None => "http://harbor.local".to_string(),
        };
        HelmRelease::new(
            "harbor",
            HARBOR_NAMESPACE,
            ("harbor", "https://helm.goharbor.io"),
            "harbor/harbor",
        )
        .set("expose.type", "clusterIP")
        .set("expose.tls.enabled", "false")
        .set("externalURL", external_url)
        .set_secret("harborAdminPassword", ctx.config.harbor_admin_password.expose())
    }

    fn plan(ctx: &StageContext) -> RegistryPlan {
        RegistryPlan::for_application(&ctx.config.app_namespace)
    }
}

#[async_trait]
impl Stage for Harbor {
    fn id(&self) -> StageId {
        StageId::Harbor
    }

    fn description(&self) -> &'static str {
        "Install Harbor and configure its Docker Hub proxy cache"
    }

    fn criticality(&self) -> Criticality {
        Criticality::BestEffort
    }

    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
        ctx.cloud.helm.install_if_absent(&Self::release(ctx)).await?;

        if let Readiness::Degraded { warning } = wait_available(ctx, HARBOR_NAMESPACE, &[HARBOR_CORE]).await? {
            return Err(BootstrapError::Registry { reason: warning });
        }

        let tunnel = ctx
            .port_forwarder
            .forward(HARBOR_NAMESPACE, &format!("svc/{HARBOR_CORE}"), 80)?;
        let api = ctx.registry.connect(
            &tunnel.local_url(),
            "admin",
            ctx.config.harbor_admin_password.expose(),
        )?;
        let report = RegistryBootstrapper::new(api, ctx.policy(ctx.config.timeouts.harbor_ready_secs))
            .run(&Self::plan(ctx))
            .await?;
        drop(tunnel);

        info!(
            registry_id = report.registry_id,
            endpoint_created = report.endpoint_created,
            projects_created = ?report.projects_created,
            "harbor configured"
        );
        ctx.state.harbor_registry_id.set(report.registry_id)
    }

    fn remediation(&self, ctx: &StageContext) -> Option<String> {
        Some(Self::plan(ctx).manual_fallback("http://127.0.0.1:8080"))
    }
}
