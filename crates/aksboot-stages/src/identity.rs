//! Federated identity binding for provider service accounts
//!
//! For every service account a Crossplane provider runs under, the managed identity
//! gets a federated credential trusting the cluster's OIDC issuer, the service
//! account is annotated with the identity's client id, and the provider deployment's
//! pod template gets the workload identity label. Pods only pick the token up on
//! restart, so the deployment is restarted whenever anything changed or a running
//! pod still lacks the injected client id.

use tracing::{debug, info, warn};

use aksboot_cloud::az::FederatedCredentialSpec;
use aksboot_cloud::{Cloud, ensure};
use aksboot_utils::BootstrapError;

use crate::manifests::{
    WORKLOAD_IDENTITY_CLIENT_ID, WORKLOAD_IDENTITY_CLIENT_ID_ENV, WORKLOAD_IDENTITY_USE_LABEL,
    pod_template_label_patch,
};

/// Binds service accounts in one namespace to one managed identity.
pub struct IdentityBinder<'a> {
    cloud: &'a Cloud,
    resource_group: &'a str,
    identity_name: &'a str,
    issuer: &'a str,
    client_id: &'a str,
    namespace: &'a str,
}

/// Per-account result of [`IdentityBinder::bind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub service_account: String,
    pub credential_created: bool,
    pub annotated: bool,
    pub labelled: bool,
    pub restarted: bool,
}

impl Binding {
    fn changed(&self) -> bool {
        self.credential_created || self.annotated || self.labelled
    }
}

impl<'a> IdentityBinder<'a> {
    #[must_use]
    pub fn new(
        cloud: &'a Cloud,
        resource_group: &'a str,
        identity_name: &'a str,
        issuer: &'a str,
        client_id: &'a str,
        namespace: &'a str,
    ) -> Self {
        Self {
            cloud,
            resource_group,
            identity_name,
            issuer,
            client_id,
            namespace,
        }
    }

    /// True when the credential, annotation and pod label are in place and the
    /// running pods picked them up.
    pub async fn is_bound(&self, service_account: &str) -> Result<bool, BootstrapError> {
        let credential = self
            .cloud
            .az
            .federated_credential_show(self.resource_group, self.identity_name, service_account)
            .await?;
        if credential.is_none() {
            return Ok(false);
        }
        Ok(self.annotation_current(service_account).await?
            && self.label_current(service_account).await?
            && self.pods_current(service_account).await?)
    }

    async fn annotation_current(&self, service_account: &str) -> Result<bool, BootstrapError> {
        Ok(self
            .cloud
            .kubectl
            .get("serviceaccount", service_account, Some(self.namespace))
            .await?
            .is_some_and(|sa| sa.annotation(WORKLOAD_IDENTITY_CLIENT_ID) == Some(self.client_id)))
    }

    async fn label_current(&self, deployment: &str) -> Result<bool, BootstrapError> {
        Ok(self
            .cloud
            .kubectl
            .get("deployment", deployment, Some(self.namespace))
            .await?
            .is_some_and(|d| d.pod_template_label(WORKLOAD_IDENTITY_USE_LABEL) == Some("true")))
    }

    /// Every running pod of `deployment` carries the label and the injected client id.
    /// No pods means nothing to restart.
    async fn pods_current(&self, deployment: &str) -> Result<bool, BootstrapError> {
        let kubectl = &self.cloud.kubectl;
        let Some(workload) = kubectl.get("deployment", deployment, Some(self.namespace)).await? else {
            return Ok(false);
        };
        let selector = workload.match_labels();
        if selector.is_empty() {
            return Ok(true);
        }
        let pods = kubectl.list_selected("pod", Some(self.namespace), &selector).await?;
        let stale = pods
            .items
            .iter()
            .filter(|pod| {
                pod.metadata.labels.get(WORKLOAD_IDENTITY_USE_LABEL).map(String::as_str) != Some("true")
                    || !pod.env_in_all_containers(WORKLOAD_IDENTITY_CLIENT_ID_ENV, self.client_id)
            })
            .count();
        if stale > 0 {
            debug!(deployment = %deployment, stale, "pods predate the identity binding");
        }
        Ok(stale == 0)
    }

    /// Bind one service account. Every step is skipped when already in place.
    pub async fn bind(&self, service_account: &str) -> Result<Binding, BootstrapError> {
        let spec = FederatedCredentialSpec::for_service_account(self.issuer, self.namespace, service_account);
        let az = &self.cloud.az;

        let credential = ensure(
            &format!("federated credential {service_account}"),
            || async {
                let existing = az
                    .federated_credential_show(self.resource_group, self.identity_name, &spec.name)
                    .await?;
                if let Some(existing) = &existing {
                    if existing.issuer != spec.issuer || existing.subject != spec.subject {
                        warn!(
                            credential = %spec.name,
                            issuer = %existing.issuer,
                            subject = %existing.subject,
                            "existing federated credential differs, leaving it untouched"
                        );
                    }
                }
                Ok::<_, BootstrapError>(existing.map(drop))
            },
            || az.federated_credential_create(self.resource_group, self.identity_name, &spec),
        )
        .await?;

        let kubectl = &self.cloud.kubectl;
        let annotated = !self.annotation_current(service_account).await?;
        if annotated {
            kubectl
                .annotate(
                    "serviceaccount",
                    service_account,
                    Some(self.namespace),
                    WORKLOAD_IDENTITY_CLIENT_ID,
                    self.client_id,
                )
                .await?;
        }

        let labelled = !self.label_current(service_account).await?;
        if labelled {
            kubectl
                .patch_merge(
                    "deployment",
                    service_account,
                    Some(self.namespace),
                    &pod_template_label_patch(),
                )
                .await?;
        }

        let mut binding = Binding {
            service_account: service_account.to_string(),
            credential_created: credential.was_created(),
            annotated,
            labelled,
            restarted: false,
        };
        // a restart that failed on a previous run leaves stale pods behind
        if binding.changed() || !self.pods_current(service_account).await? {
            kubectl.rollout_restart(service_account, self.namespace).await?;
            binding.restarted = true;
        }

        info!(
            service_account = %service_account,
            credential_created = binding.credential_created,
            restarted = binding.restarted,
            "service account bound to managed identity"
        );
        Ok(binding)
    }

    /// Bind every account in order; the first failure stops the loop.
    pub async fn bind_all(&self, service_accounts: &[String]) -> Result<Vec<Binding>, BootstrapError> {
        let mut bindings = Vec::with_capacity(service_accounts.len());
        for sa in service_accounts {
            bindings.push(self.bind(sa).await?);
        }
        Ok(bindings)
    }
}
