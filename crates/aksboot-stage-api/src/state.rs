//! Values discovered while the pipeline runs
//!
//! Each field is written once by the stage that discovers it and read by later
//! stages. Writing the same value again is accepted (re-runs rediscover everything);
//! writing a different value is a [`BootstrapError::StateConflict`].

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use aksboot_utils::BootstrapError;

/// A value [`WriteOnce`] can hold.
pub trait StateValue: Clone + PartialEq + Send {
    /// Rendering used in conflict errors.
    fn render(&self) -> String;
}

impl StateValue for String {
    fn render(&self) -> String {
        self.clone()
    }
}

impl StateValue for i64 {
    fn render(&self) -> String {
        self.to_string()
    }
}

impl StateValue for Vec<String> {
    fn render(&self) -> String {
        self.join(",")
    }
}

/// A named slot that accepts one distinct value.
#[derive(Debug)]
pub struct WriteOnce<T> {
    field: &'static str,
    value: Mutex<Option<T>>,
}

impl<T: StateValue> WriteOnce<T> {
    #[must_use]
    pub const fn named(field: &'static str) -> Self {
        Self {
            field,
            value: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`; a repeat of the stored value is a no-op.
    pub fn set(&self, value: T) -> Result<(), BootstrapError> {
        let mut slot = self.slot();
        match slot.as_ref() {
            None => {
                *slot = Some(value);
                Ok(())
            }
            Some(existing) if *existing == value => Ok(()),
            Some(existing) => Err(BootstrapError::StateConflict {
                field: self.field.to_string(),
                existing: existing.render(),
                attempted: value.render(),
            }),
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.slot().clone()
    }

    /// The value, or [`BootstrapError::Undiscovered`] naming the field.
    pub fn require(&self) -> Result<T, BootstrapError> {
        self.get().ok_or_else(|| BootstrapError::Undiscovered {
            field: self.field.to_string(),
        })
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot().is_some()
    }

    #[must_use]
    pub fn field(&self) -> &'static str {
        self.field
    }
}

/// Everything the stages learn about the environment. Not persisted.
#[derive(Debug)]
pub struct DiscoveredState {
    pub subscription_id: WriteOnce<String>,
    pub tenant_id: WriteOnce<String>,
    pub oidc_issuer_url: WriteOnce<String>,
    pub acr_login_server: WriteOnce<String>,
    pub identity_client_id: WriteOnce<String>,
    pub identity_principal_id: WriteOnce<String>,
    pub load_balancer_ip: WriteOnce<String>,
    pub provider_service_accounts: WriteOnce<Vec<String>>,
    pub harbor_registry_id: WriteOnce<i64>,
}

impl Default for DiscoveredState {
    fn default() -> Self {
        Self {
            subscription_id: WriteOnce::named("subscription_id"),
            tenant_id: WriteOnce::named("tenant_id"),
            oidc_issuer_url: WriteOnce::named("oidc_issuer_url"),
            acr_login_server: WriteOnce::named("acr_login_server"),
            identity_client_id: WriteOnce::named("identity_client_id"),
            identity_principal_id: WriteOnce::named("identity_principal_id"),
            load_balancer_ip: WriteOnce::named("load_balancer_ip"),
            provider_service_accounts: WriteOnce::named("provider_service_accounts"),
            harbor_registry_id: WriteOnce::named("harbor_registry_id"),
        }
    }
}

impl DiscoveredState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy for the run report.
    #[must_use]
    pub fn snapshot(&self) -> DiscoveredSnapshot {
        DiscoveredSnapshot {
            subscription_id: self.subscription_id.get(),
            tenant_id: self.tenant_id.get(),
            oidc_issuer_url: self.oidc_issuer_url.get(),
            acr_login_server: self.acr_login_server.get(),
            identity_client_id: self.identity_client_id.get(),
            identity_principal_id: self.identity_principal_id.get(),
            load_balancer_ip: self.load_balancer_ip.get(),
            provider_service_accounts: self.provider_service_accounts.get().unwrap_or_default(),
            harbor_registry_id: self.harbor_registry_id.get(),
        }
    }
}

/// Serializable view of [`DiscoveredState`]. Holds identifiers only, never secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveredSnapshot {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub oidc_issuer_url: Option<String>,
    pub acr_login_server: Option<String>,
    pub identity_client_id: Option<String>,
    pub identity_principal_id: Option<String>,
    pub load_balancer_ip: Option<String>,
    pub provider_service_accounts: Vec<String>,
    pub harbor_registry_id: Option<i64>,
}
