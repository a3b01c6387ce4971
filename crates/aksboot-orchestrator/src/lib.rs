//! Bootstrap orchestration for aksboot
//!
//! - [`Sequencer`]: runs stages in order and classifies every outcome
//! - [`BootstrapHandle`]: facade owning the run context, with interrupt handling
//! - [`RunReport`]: canonical JSON report of a run
//! - [`summary`]: human-readable rendering of reports, plans and doctor output
//!
//! Outside this crate, use [`BootstrapHandle`]; [`Sequencer`] is exposed for tests
//! and custom pipelines.

mod handle;
mod report;
mod sequencer;
pub mod summary;

pub use handle::{BootstrapHandle, RunOutcome};
pub use report::{REPORT_SCHEMA_VERSION, RunReport};
pub use sequencer::{PlannedStage, SequenceResult, Sequencer};
