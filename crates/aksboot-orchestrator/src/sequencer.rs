//! Stage sequencer
//!
//! Runs stages strictly in order. For every stage: `check`, `apply` unless already
//! satisfied, then `wait`. The outcome is classified as follows.
//!
//! | check     | apply/wait              | criticality | outcome                    |
//! |-----------|-------------------------|-------------|----------------------------|
//! | satisfied | wait ready              | any         | `SkippedAlreadySatisfied`  |
//! | pending   | wait ready              | any         | `Succeeded`                |
//! | any       | wait degraded           | any         | `FailedNonFatalWarned`     |
//! | any       | error                   | best-effort | `FailedNonFatalWarned`     |
//! | any       | error                   | fatal       | `FailedFatal`, run aborted |
//!
//! Interruption is fatal whatever the stage's criticality.

use tokio::time::Instant;
use tracing::Instrument;

use aksboot_stage_api::{
    Criticality, Precondition, Readiness, Stage, StageContext, StageId, StageOutcome, StageRecord,
};
use aksboot_utils::BootstrapError;
use aksboot_utils::logging::{
    log_stage_complete, log_stage_failed, log_stage_skipped, log_stage_start, log_stage_warned,
    stage_span,
};

/// A stage as listed by `plan`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PlannedStage {
    pub stage: StageId,
    pub criticality: Criticality,
    pub description: &'static str,
}

/// Records of a run, plus the error that aborted it.
#[derive(Debug)]
pub struct SequenceResult {
    pub records: Vec<StageRecord>,
    pub fatal: Option<(StageId, BootstrapError)>,
}

impl SequenceResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.fatal.is_none()
    }
}

/// What a stage did before its outcome is classified.
enum Progress {
    Skipped(String),
    Applied,
}

pub struct Sequencer {
    stages: Vec<Box<dyn Stage>>,
}

impl Sequencer {
    #[must_use]
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The full bootstrap pipeline.
    #[must_use]
    pub fn bootstrap() -> Self {
        Self::new(aksboot_stages::default_pipeline())
    }

    #[must_use]
    pub fn plan(&self) -> Vec<PlannedStage> {
        self.stages
            .iter()
            .map(|s| PlannedStage {
                stage: s.id(),
                criticality: s.criticality(),
                description: s.description(),
            })
            .collect()
    }

    /// Run every stage until the first fatal failure.
    pub async fn run(&self, ctx: &StageContext) -> SequenceResult {
        let mut records = Vec::with_capacity(self.stages.len());
        let fatal = self.run_into(ctx, &mut records).await;
        SequenceResult { records, fatal }
    }

    /// Like [`Sequencer::run`], pushing each record as soon as its stage ends.
    ///
    /// Records of finished stages survive when the future is dropped mid-run.
    pub async fn run_into(
        &self,
        ctx: &StageContext,
        records: &mut Vec<StageRecord>,
    ) -> Option<(StageId, BootstrapError)> {
        let total = self.stages.len();
        for (index, stage) in self.stages.iter().enumerate() {
            let span = stage_span(stage.id().as_str(), index + 1, total);
            let (record, error) = run_stage(stage.as_ref(), ctx).instrument(span).await;
            records.push(record);
            if let Some(error) = error {
                return Some((stage.id(), error));
            }
        }
        None
    }

    /// Stage that runs after `completed` finished stages.
    #[must_use]
    pub fn stage_after(&self, completed: usize) -> Option<StageId> {
        self.stages.get(completed).map(|s| s.id())
    }
}

async fn drive(stage: &dyn Stage, ctx: &StageContext) -> Result<(Progress, Readiness), BootstrapError> {
    let progress = match stage.check(ctx).await? {
        Precondition::Satisfied { reason } => Progress::Skipped(reason),
        Precondition::Pending => {
            stage.apply(ctx).await?;
            Progress::Applied
        }
    };
    // wait also runs for satisfied stages so discovered values are recorded
    let readiness = stage.wait(ctx).await?;
    Ok((progress, readiness))
}

/// Run one stage and classify it. The error is returned only when it is fatal.
async fn run_stage(stage: &dyn Stage, ctx: &StageContext) -> (StageRecord, Option<BootstrapError>) {
    let id = stage.id();
    let name = id.as_str();
    log_stage_start(name, stage.description());
    let start = Instant::now();

    let result = drive(stage, ctx).await;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let record = |outcome, message: Option<String>, remediation: Option<String>| StageRecord {
        stage: id,
        outcome,
        message,
        remediation,
        duration_ms,
    };

    match result {
        Ok((Progress::Skipped(reason), Readiness::Ready)) => {
            log_stage_skipped(name, &reason, duration_ms);
            (record(StageOutcome::SkippedAlreadySatisfied, Some(reason), None), None)
        }
        Ok((Progress::Applied, Readiness::Ready)) => {
            log_stage_complete(name, duration_ms);
            (record(StageOutcome::Succeeded, None, None), None)
        }
        Ok((_, Readiness::Degraded { warning })) => {
            log_stage_warned(name, &warning, duration_ms);
            let remediation = stage.remediation(ctx);
            (record(StageOutcome::FailedNonFatalWarned, Some(warning), remediation), None)
        }
        Err(error)
            if stage.criticality() == Criticality::BestEffort
                && !matches!(error, BootstrapError::Interrupted) =>
        {
            let message = error.to_string();
            log_stage_warned(name, &message, duration_ms);
            let remediation = stage.remediation(ctx);
            (record(StageOutcome::FailedNonFatalWarned, Some(message), remediation), None)
        }
        Err(error) => {
            let message = error.to_string();
            log_stage_failed(name, &message, duration_ms);
            (record(StageOutcome::FailedFatal, Some(message), None), Some(error))
        }
    }
}
