//! Harbor registry bootstrap
//!
//! Harbor is reached only through a short-lived port-forward, so everything here
//! talks to a base URL handed in by the caller. [`RegistryApi`] is the seam the
//! bootstrapper is tested through.

mod bootstrap;
mod client;
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use bootstrap::{RegistryBootstrapper, RegistryPlan, RegistryReport};
pub use client::{HarborClient, HarborConnector};
pub use error::RegistryError;

/// A remote registry Harbor can proxy (`/api/v2.0/registries`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEndpoint {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Body of `POST /api/v2.0/registries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRegistry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub insecure: bool,
}

impl NewRegistry {
    #[must_use]
    pub fn docker_hub(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "docker-hub".to_string(),
            url: "https://hub.docker.com".to_string(),
            insecure: false,
        }
    }
}

/// Body of `POST /api/v2.0/projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProject {
    pub project_name: String,
    pub public: bool,
    /// Set for proxy-cache projects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<i64>,
}

/// Harbor operations the bootstrap needs.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn ping(&self) -> Result<(), RegistryError>;
    async fn find_registry(&self, name: &str) -> Result<Option<RegistryEndpoint>, RegistryError>;
    async fn create_registry(&self, registry: &NewRegistry) -> Result<(), RegistryError>;
    async fn project_exists(&self, name: &str) -> Result<bool, RegistryError>;
    async fn create_project(&self, project: &NewProject) -> Result<(), RegistryError>;
}

/// Builds a [`RegistryApi`] for a base URL and admin credentials.
pub trait RegistryConnector: Send + Sync {
    fn connect(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn RegistryApi>, RegistryError>;
}
