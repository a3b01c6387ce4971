//! Pull-through registry bootstrap
//!
//! Ensures a Docker Hub endpoint, a proxy-cache project bound to it and the
//! application project. Each object is checked before it is created, so a second run
//! only issues reads.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use aksboot_cloud::ensure;
use aksboot_utils::{BootstrapError, PollPolicy, poll_until};

use crate::{NewProject, NewRegistry, RegistryApi, RegistryEndpoint, RegistryError};

/// Names of the objects to ensure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPlan {
    pub endpoint_name: String,
    pub proxy_project: String,
    pub app_project: String,
}

impl RegistryPlan {
    /// Docker Hub proxy plus a private project named after the application.
    #[must_use]
    pub fn for_application(app_project: &str) -> Self {
        Self {
            endpoint_name: "docker-hub".to_string(),
            proxy_project: "dockerhub-proxy".to_string(),
            app_project: app_project.to_string(),
        }
    }

    /// Steps an operator can follow in the Harbor UI when the bootstrap fails.
    #[must_use]
    pub fn manual_fallback(&self, harbor_url: &str) -> String {
        format!(
            "Configure Harbor manually at {harbor_url} (user admin):\n\
             1. Administration > Registries > New Endpoint: provider Docker Hub, name '{}'\n\
             2. Projects > New Project: '{}', public, Proxy Cache enabled with endpoint '{}'\n\
             3. Projects > New Project: '{}', private\n\
             Reach the UI with: kubectl port-forward -n harbor svc/harbor-core 8080:80",
            self.endpoint_name, self.proxy_project, self.endpoint_name, self.app_project
        )
    }
}

/// What the bootstrap found or created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryReport {
    pub registry_id: i64,
    pub endpoint_created: bool,
    pub projects_created: Vec<String>,
}

impl RegistryReport {
    /// True when nothing had to be created.
    #[must_use]
    pub fn was_converged(&self) -> bool {
        !self.endpoint_created && self.projects_created.is_empty()
    }
}

/// Drives a [`RegistryApi`] to the state described by a [`RegistryPlan`].
pub struct RegistryBootstrapper {
    api: Arc<dyn RegistryApi>,
    ready_policy: PollPolicy,
}

impl RegistryBootstrapper {
    #[must_use]
    pub fn new(api: Arc<dyn RegistryApi>, ready_policy: PollPolicy) -> Self {
        Self { api, ready_policy }
    }

    /// Poll the ping endpoint until Harbor answers.
    ///
    /// Transport failures and gateway errors count as "not yet"; any other answer is
    /// an error.
    pub async fn wait_ready(&self) -> Result<(), BootstrapError> {
        let api = &self.api;
        poll_until(self.ready_policy, "Harbor API", move || async move {
            match api.ping().await {
                Ok(()) => Ok(Some(())),
                Err(e) if e.is_unreachable() => {
                    debug!(error = %e, "Harbor not reachable yet");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .or_fatal("Harbor API")
    }

    /// The proxy endpoint, created when missing.
    pub async fn ensure_endpoint(&self, name: &str) -> Result<(RegistryEndpoint, bool), BootstrapError> {
        let api = &self.api;
        let provisioned = ensure(
            &format!("Harbor registry endpoint {name}"),
            || async { Ok::<_, BootstrapError>(api.find_registry(name).await?) },
            || async {
                api.create_registry(&NewRegistry::docker_hub(name)).await?;
                // creation returns no body; read the id back
                let found = api.find_registry(name).await?;
                found.ok_or_else(|| {
                    BootstrapError::from(RegistryError::Decode {
                        path: "/api/v2.0/registries".to_string(),
                        reason: format!("endpoint '{name}' missing after creation"),
                    })
                })
            },
        )
        .await?;

        let created = provisioned.was_created();
        Ok((provisioned.into_inner(), created))
    }

    /// A project, created when missing. Returns whether it was created.
    pub async fn ensure_project(&self, project: &NewProject) -> Result<bool, BootstrapError> {
        let api = &self.api;
        let name = project.project_name.as_str();
        let provisioned = ensure(
            &format!("Harbor project {name}"),
            || async { Ok::<_, BootstrapError>(api.project_exists(name).await?.then_some(())) },
            || async { Ok::<_, BootstrapError>(api.create_project(project).await?) },
        )
        .await?;
        Ok(provisioned.was_created())
    }

    /// Wait for Harbor, then ensure the endpoint and both projects.
    pub async fn run(&self, plan: &RegistryPlan) -> Result<RegistryReport, BootstrapError> {
        self.wait_ready().await?;

        let (endpoint, endpoint_created) = self.ensure_endpoint(&plan.endpoint_name).await?;

        let mut projects_created = Vec::new();
        let projects = [
            NewProject {
                project_name: plan.proxy_project.clone(),
                public: true,
                registry_id: Some(endpoint.id),
            },
            NewProject {
                project_name: plan.app_project.clone(),
                public: false,
                registry_id: None,
            },
        ];
        for project in &projects {
            if self.ensure_project(project).await? {
                projects_created.push(project.project_name.clone());
            }
        }

        info!(
            registry_id = endpoint.id,
            endpoint_created,
            projects_created = projects_created.len(),
            "Harbor registry bootstrapped"
        );
        Ok(RegistryReport {
            registry_id: endpoint.id,
            endpoint_created,
            projects_created,
        })
    }
}
