//! Facade used by the CLI and by embedders.
//!
//! A [`BootstrapHandle`] owns one [`StageContext`] and the pipeline. `up` runs it
//! to completion or until interrupted, and always produces a [`RunReport`], also
//! when the run fails.

use chrono::Utc;
use std::future::Future;
use tracing::{info, warn};

use aksboot_doctor::DoctorCommand;
use aksboot_stage_api::{StageContext, StageOutcome, StageRecord};
use aksboot_stages::announcer::hostnames;
use aksboot_utils::types::DoctorOutput;
use aksboot_utils::{BootstrapError, ExitCode};

use crate::report::{REPORT_SCHEMA_VERSION, RunReport};
use crate::sequencer::{PlannedStage, Sequencer};

/// Report of a finished run, plus the error that ended it early.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub error: Option<BootstrapError>,
}

impl RunOutcome {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        self.error.as_ref().map_or(ExitCode::SUCCESS, ExitCode::from)
    }
}

pub struct BootstrapHandle {
    ctx: StageContext,
    sequencer: Sequencer,
}

impl BootstrapHandle {
    /// Handle over the full bootstrap pipeline.
    #[must_use]
    pub fn new(ctx: StageContext) -> Self {
        Self::with_sequencer(ctx, Sequencer::bootstrap())
    }

    #[must_use]
    pub fn with_sequencer(ctx: StageContext, sequencer: Sequencer) -> Self {
        Self { ctx, sequencer }
    }

    #[must_use]
    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    #[must_use]
    pub fn plan(&self) -> Vec<PlannedStage> {
        self.sequencer.plan()
    }

    /// Run the pipeline; Ctrl-C aborts it with [`BootstrapError::Interrupted`].
    pub async fn up(&self) -> RunOutcome {
        self.up_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the pipeline until `interrupt` resolves.
    ///
    /// Dropping the pipeline future drops whatever the running stage owns, so an
    /// open port-forward is terminated before this returns.
    pub async fn up_until<F>(&self, interrupt: F) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        let started_at = Utc::now();
        let mut records: Vec<StageRecord> = Vec::new();

        let finished = tokio::select! {
            fatal = self.sequencer.run_into(&self.ctx, &mut records) => Some(fatal),
            () = interrupt => None,
        };

        let fatal = match finished {
            Some(fatal) => fatal,
            None => {
                warn!("interrupted, stopping the pipeline");
                let stage = self.sequencer.stage_after(records.len());
                if let Some(stage) = stage {
                    records.push(StageRecord {
                        stage,
                        outcome: StageOutcome::FailedFatal,
                        message: Some(BootstrapError::Interrupted.to_string()),
                        remediation: None,
                        duration_ms: 0,
                    });
                }
                stage.map(|s| (s, BootstrapError::Interrupted))
            }
        };

        let discovered = self.ctx.state.snapshot();
        let endpoints = discovered
            .load_balancer_ip
            .as_deref()
            .map(|ip| hostnames(&self.ctx.config.announce_services, ip))
            .unwrap_or_default();

        let (failed_stage, error) = match fatal {
            Some((stage, error)) => (Some(stage), Some(error)),
            None => (None, None),
        };
        let report = RunReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            started_at,
            finished_at: Utc::now(),
            ok: error.is_none(),
            failed_stage,
            error: error.as_ref().map(ToString::to_string),
            records,
            discovered,
            endpoints,
        };
        if report.ok {
            info!(warned = report.warnings().count(), "bootstrap converged");
        }
        RunOutcome { report, error }
    }

    /// Tool and login checks only; no cloud resource is touched.
    pub async fn doctor(&self) -> DoctorOutput {
        let mut doctor = DoctorCommand::new(self.ctx.cloud.az.clone());
        if let Some(path) = &self.ctx.tool_search_path {
            doctor = doctor.with_search_path(path.clone());
        }
        doctor.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aksboot_config::RunConfig;
    use aksboot_runner::test_support::ScriptedRunner;
    use aksboot_stage_api::test_support::test_context;
    use aksboot_stage_api::{Stage, StageId};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Discovers the load balancer address, optionally after a long wait.
    struct Step {
        id: StageId,
        delay: Option<Duration>,
        ip: Option<&'static str>,
    }

    #[async_trait]
    impl Stage for Step {
        fn id(&self) -> StageId {
            self.id
        }

        fn description(&self) -> &'static str {
            "step"
        }

        async fn apply(&self, ctx: &StageContext) -> Result<(), BootstrapError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(ip) = self.ip {
                ctx.state.load_balancer_ip.set(ip.to_string())?;
            }
            Ok(())
        }
    }

    fn handle(stages: Vec<Box<dyn Stage>>) -> BootstrapHandle {
        let ctx = test_context(RunConfig::default(), Arc::new(ScriptedRunner::new()));
        BootstrapHandle::with_sequencer(ctx, Sequencer::new(stages))
    }

    #[tokio::test]
    async fn test_report_carries_discovered_state_and_endpoints() {
        let handle = handle(vec![Box::new(Step {
            id: StageId::IngressController,
            delay: None,
            ip: Some("203.0.113.5"),
        })]);

        let outcome = handle.up_until(std::future::pending()).await;

        assert_eq!(outcome.exit_code(), ExitCode::SUCCESS);
        assert!(outcome.report.ok);
        assert_eq!(
            outcome.report.discovered.load_balancer_ip.as_deref(),
            Some("203.0.113.5")
        );
        assert_eq!(
            outcome.report.endpoints.get("argocd").map(String::as_str),
            Some("argocd.203.0.113.5.nip.io")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_stops_the_running_stage() {
        let handle = handle(vec![
            Box::new(Step {
                id: StageId::Namespaces,
                delay: None,
                ip: None,
            }),
            Box::new(Step {
                id: StageId::IngressController,
                delay: Some(Duration::from_secs(3600)),
                ip: None,
            }),
        ]);

        let outcome = handle
            .up_until(tokio::time::sleep(Duration::from_secs(5)))
            .await;

        assert_eq!(outcome.exit_code(), ExitCode::INTERRUPTED);
        assert!(!outcome.report.ok);
        assert_eq!(outcome.report.failed_stage, Some(StageId::IngressController));
        let outcomes: Vec<StageOutcome> = outcome.report.records.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![StageOutcome::Succeeded, StageOutcome::FailedFatal]);
        assert!(outcome.report.endpoints.is_empty());
    }
}
