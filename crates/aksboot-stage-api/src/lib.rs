//! Stage contract for the bootstrap pipeline
//!
//! This crate is the shared contract between the sequencer and the concrete stages.
//! A stage is three operations run in order:
//!
//! - `check()`: is the desired state already there?
//! - `apply()`: converge towards it (skipped when `check` says satisfied)
//! - `wait()`: block on the postcondition and record discovered values
//!
//! `wait` runs even for satisfied stages, so a re-run repopulates
//! [`DiscoveredState`] for the stages after it.

mod context;
mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use aksboot_utils::BootstrapError;

pub use context::{SecretPrompt, StageContext};
pub use state::{DiscoveredSnapshot, DiscoveredState, StateValue, WriteOnce};

/// Identifier of a pipeline stage, in kebab-case on the wire and the CLI.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StageId {
    Preflight,
    ResourceGroup,
    AksCluster,
    ClusterCredentials,
    OidcIssuer,
    ContainerRegistry,
    ManagedIdentity,
    Namespaces,
    IngressController,
    Crossplane,
    CrossplaneProviders,
    ProviderIdentities,
    ProviderConfig,
    Composition,
    DatabaseSecret,
    DashboardImage,
    Harbor,
    Argocd,
    RootApplication,
    EndpointAnnounce,
    ConnectionSecret,
}

impl StageId {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Whether a stage failure aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure aborts the pipeline
    Fatal,
    /// Failure is logged with remediation and the pipeline continues
    BestEffort,
}

/// Answer of [`Stage::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Desired state already present; `apply` is skipped
    Satisfied { reason: String },
    /// `apply` has to run
    Pending,
}

impl Precondition {
    pub fn satisfied(reason: impl Into<String>) -> Self {
        Self::Satisfied {
            reason: reason.into(),
        }
    }
}

/// Answer of [`Stage::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Postcondition not reached in time but nothing later strictly depends on it
    Degraded { warning: String },
}

impl Readiness {
    pub fn degraded(warning: impl Into<String>) -> Self {
        Self::Degraded {
            warning: warning.into(),
        }
    }

    /// `Ready` when `reached`, otherwise `Degraded` with `warning`.
    pub fn from_reached(reached: bool, warning: impl Into<String>) -> Self {
        if reached {
            Self::Ready
        } else {
            Self::degraded(warning)
        }
    }
}

/// How a stage ended. Drives the control flow of the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    SkippedAlreadySatisfied,
    FailedFatal,
    FailedNonFatalWarned,
}

impl StageOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::SkippedAlreadySatisfied => "skipped",
            Self::FailedFatal => "failed",
            Self::FailedNonFatalWarned => "warned",
        }
    }

    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::FailedFatal)
    }
}

/// One line of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub outcome: StageOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Manual steps for warned failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub duration_ms: u64,
}

/// A named, idempotent step of the bootstrap.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// One-line summary for `plan` and logs.
    fn description(&self) -> &'static str;

    fn criticality(&self) -> Criticality {
        Criticality::Fatal
    }

    /// Inspect the environment. The default always applies.
    async fn check(&self, _ctx: &StageContext) -> Result<Precondition, BootstrapError> {
        Ok(Precondition::Pending)
    }

    /// Converge towards the desired state. Must be safe to repeat.
    async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError>;

    /// Block on the postcondition and record what later stages need.
    async fn wait(&self, _ctx: &StageContext) -> Result<Readiness, BootstrapError> {
        Ok(Readiness::Ready)
    }

    /// Manual steps to print when the stage fails without aborting the run.
    fn remediation(&self, _ctx: &StageContext) -> Option<String> {
        None
    }
}
