//! aksboot - idempotent bootstrap of an AKS platform
//!
//! Brings up a managed Kubernetes cluster on Azure and layers the platform on top:
//! ingress, Crossplane with workload-identity-bound providers, Harbor as a Docker Hub
//! proxy cache, and Argo CD pointed at the repository. Every stage checks before it
//! changes anything, so re-running after a partial failure converges.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Check that az, kubectl, helm and git are usable
//! aksboot doctor
//!
//! # List the stages and where each setting comes from
//! aksboot plan --verbose
//!
//! # Run the bootstrap (the default command)
//! RESOURCE_GROUP=my-rg CLUSTER_NAME=my-aks aksboot up --json
//! ```
//!
//! # Library
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aksboot::{BootstrapHandle, NativeRunner, ProcessEnv, RunConfig, StageContext, TerminalPrompt};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::load(None, &ProcessEnv)?;
//! let ctx = StageContext::new(config, Arc::new(NativeRunner::new()), Arc::new(TerminalPrompt));
//! let outcome = BootstrapHandle::new(ctx).up().await;
//! println!("{}", outcome.report.to_json()?);
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Contracts
//!
//! Run reports and doctor output are emitted in JCS (RFC 8785) canonical form.
//! Exit codes are listed in [`ExitCode`].

pub mod cli;

pub use aksboot_config::{ProcessEnv, RunConfig};
pub use aksboot_orchestrator::{BootstrapHandle, PlannedStage, RunOutcome, RunReport, Sequencer};
pub use aksboot_runner::NativeRunner;
pub use aksboot_stage_api::{Criticality, Stage, StageContext, StageId, StageOutcome, StageRecord};
pub use aksboot_stages::TerminalPrompt;
pub use aksboot_utils::canonicalization::emit_jcs;
pub use aksboot_utils::{BootstrapError, ExitCode};
