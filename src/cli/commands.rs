//! CLI command implementations

use anyhow::{Context, Result};
use std::sync::Arc;

use aksboot_config::RunConfig;
use aksboot_orchestrator::BootstrapHandle;
use aksboot_orchestrator::summary::{print_doctor, print_summary, render_plan};
use aksboot_runner::NativeRunner;
use aksboot_stage_api::StageContext;
use aksboot_stages::TerminalPrompt;
use aksboot_utils::ExitCode;
use aksboot_utils::canonicalization::emit_jcs;

fn handle(config: RunConfig) -> BootstrapHandle {
    let ctx = StageContext::new(config, Arc::new(NativeRunner::new()), Arc::new(TerminalPrompt));
    BootstrapHandle::new(ctx)
}

fn report_failure(err: &anyhow::Error) -> ExitCode {
    eprintln!("✗ {err:#}");
    ExitCode::INTERNAL
}

/// Run the pipeline and print the report.
pub async fn execute_up(config: RunConfig, json: bool) -> ExitCode {
    let outcome = handle(config).up().await;

    if json {
        match outcome.report.to_json().context("Failed to emit run report JSON") {
            Ok(text) => println!("{text}"),
            Err(e) => return report_failure(&e),
        }
    } else {
        print_summary(&outcome.report);
    }

    if let Some(err) = &outcome.error {
        eprintln!();
        eprintln!("{}", err.display_for_user());
    }
    outcome.exit_code()
}

/// Tool and login checks. Exit code follows the first failing check.
pub async fn execute_doctor(config: RunConfig, json: bool) -> ExitCode {
    let handle = handle(config);
    let output = handle.doctor().await;

    if json {
        match emit_jcs(&output).context("Failed to emit doctor JSON") {
            Ok(text) => println!("{text}"),
            Err(e) => return report_failure(&e),
        }
    } else {
        print_doctor(&output);
    }

    match output.first_failure() {
        None => ExitCode::SUCCESS,
        Some(check) if check.name.starts_with("tool:") => ExitCode::PREREQUISITE,
        Some(_) => ExitCode::NOT_AUTHENTICATED,
    }
}

/// Print the stage list.
pub fn execute_plan(config: &RunConfig, verbose: bool, json: bool) -> ExitCode {
    let result: Result<()> = (|| {
        let plan = aksboot_orchestrator::Sequencer::bootstrap().plan();
        if json {
            println!("{}", emit_jcs(&plan).context("Failed to emit plan JSON")?);
        } else {
            print!("{}", render_plan(&plan, verbose.then_some(config)));
        }
        Ok(())
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_failure(&e),
    }
}
