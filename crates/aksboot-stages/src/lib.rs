//! The bootstrap stages
//!
//! Each stage implements [`aksboot_stage_api::Stage`]. [`default_pipeline`] returns
//! them in dependency order; the orchestrator runs them front to back.

pub mod announcer;
pub mod azure;
pub mod cluster;
pub mod crossplane;
pub mod gitops;
pub mod identity;
pub mod manifests;
pub mod prompt;
pub mod workloads;

pub use announcer::{Announcement, EndpointAnnouncer};
pub use identity::{Binding, IdentityBinder};
pub use prompt::TerminalPrompt;

use aksboot_stage_api::Stage;

/// All stages, in the order they must run.
#[must_use]
pub fn default_pipeline() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(azure::Preflight),
        Box::new(azure::ResourceGroup),
        Box::new(azure::AksCluster),
        Box::new(azure::ClusterCredentials),
        Box::new(azure::OidcIssuer),
        Box::new(azure::ContainerRegistry),
        Box::new(azure::ManagedIdentity),
        Box::new(cluster::Namespaces),
        Box::new(cluster::IngressController),
        Box::new(crossplane::Crossplane),
        Box::new(crossplane::CrossplaneProviders),
        Box::new(crossplane::ProviderIdentities),
        Box::new(crossplane::ProviderConfig),
        Box::new(crossplane::Composition),
        Box::new(workloads::DatabaseSecret),
        Box::new(workloads::DashboardImage),
        Box::new(workloads::Harbor),
        Box::new(gitops::ArgoCd),
        Box::new(gitops::RootApplication),
        Box::new(gitops::EndpointAnnounce),
        Box::new(crossplane::ConnectionSecret),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use aksboot_stage_api::{Criticality, StageId};
    use strum::IntoEnumIterator;

    #[test]
    fn test_pipeline_follows_stage_order() {
        let ids: Vec<StageId> = default_pipeline().iter().map(|s| s.id()).collect();
        let declared: Vec<StageId> = StageId::iter().collect();
        assert_eq!(ids, declared);
    }

    #[test]
    fn test_best_effort_stages() {
        let best_effort: Vec<StageId> = default_pipeline()
            .iter()
            .filter(|s| s.criticality() == Criticality::BestEffort)
            .map(|s| s.id())
            .collect();
        assert_eq!(
            best_effort,
            vec![
                StageId::DashboardImage,
                StageId::Harbor,
                StageId::EndpointAnnounce,
                StageId::ConnectionSecret
            ]
        );
    }
}
