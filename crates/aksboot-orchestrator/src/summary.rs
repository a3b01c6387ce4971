//! Human-readable rendering of run reports, plans and doctor output
//!
//! Renderers return strings so they can be tested; the `print_*` wrappers write
//! them to stdout, colored when [`use_color`] says so.

use crossterm::style::{Attribute, Color, Stylize};
use std::fmt::Write as _;

use aksboot_config::{ConfigSource, RunConfig};
use aksboot_stage_api::{Criticality, StageOutcome};
use aksboot_stages::cluster::INGRESS_NAMESPACE;
use aksboot_stages::gitops::ARGOCD_NAMESPACE;
use aksboot_utils::logging::use_color;
use aksboot_utils::types::{CheckStatus, DoctorOutput};

use crate::report::RunReport;
use crate::sequencer::PlannedStage;

fn paint(text: &str, color: Color, bold: bool, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }
    let mut styled = text.with(color);
    if bold {
        styled = styled.attribute(Attribute::Bold);
    }
    format!("{styled}")
}

fn outcome_symbol(outcome: StageOutcome) -> (&'static str, Color) {
    match outcome {
        StageOutcome::Succeeded => ("✓", Color::Green),
        StageOutcome::SkippedAlreadySatisfied => ("↷", Color::DarkGrey),
        StageOutcome::FailedNonFatalWarned => ("⚠", Color::Yellow),
        StageOutcome::FailedFatal => ("✗", Color::Red),
    }
}

/// Commands an operator runs to confirm the platform after a successful run.
#[must_use]
pub fn verification_commands() -> Vec<String> {
    vec![
        "kubectl get providers.pkg.crossplane.io".to_string(),
        "kubectl get xrd".to_string(),
        format!("kubectl -n {ARGOCD_NAMESPACE} get applications"),
        format!(
            "kubectl -n {ARGOCD_NAMESPACE} get secret argocd-initial-admin-secret -o jsonpath='{{.data.password}}' | base64 -d"
        ),
        format!("kubectl -n {INGRESS_NAMESPACE} get svc ingress-nginx-controller"),
    ]
}

#[must_use]
pub fn render_summary(report: &RunReport, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", paint("aksboot run summary", Color::Cyan, true, color));
    let _ = writeln!(out, "{}", paint("───────────────────", Color::Cyan, true, color));

    for record in &report.records {
        let (symbol, tint) = outcome_symbol(record.outcome);
        let seconds = record.duration_ms as f64 / 1000.0;
        let _ = write!(
            out,
            "{} {:<22} {:>8} {:>7.1}s",
            paint(symbol, tint, true, color),
            record.stage.as_str(),
            record.outcome.as_str(),
            seconds
        );
        match (&record.message, record.outcome) {
            (Some(message), StageOutcome::SkippedAlreadySatisfied) => {
                let _ = write!(out, "  {}", paint(message, Color::DarkGrey, false, color));
            }
            (Some(message), _) => {
                let _ = write!(out, "  {message}");
            }
            (None, _) => {}
        }
        out.push('\n');
    }

    let warnings: Vec<_> = report.warnings().filter(|r| r.remediation.is_some()).collect();
    if !warnings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", paint("Manual follow-up", Color::Yellow, true, color));
        for record in warnings {
            if let Some(remediation) = &record.remediation {
                let _ = writeln!(out, "  {}:", record.stage.as_str());
                for line in remediation.lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
        }
    }

    if !report.endpoints.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", paint("Endpoints", Color::Cyan, true, color));
        for (service, host) in &report.endpoints {
            let _ = writeln!(out, "  {service:<12} http://{host}");
        }
    }

    if report.ok {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", paint("Verify", Color::Cyan, true, color));
        for command in verification_commands() {
            let _ = writeln!(out, "  {command}");
        }
    }

    let _ = writeln!(out);
    let counts = format!(
        "{} succeeded, {} skipped, {} warned, {} failed",
        report.count(StageOutcome::Succeeded),
        report.count(StageOutcome::SkippedAlreadySatisfied),
        report.count(StageOutcome::FailedNonFatalWarned),
        report.count(StageOutcome::FailedFatal),
    );
    if report.ok {
        let _ = writeln!(out, "{} {counts}", paint("✓ Bootstrap complete:", Color::Green, true, color));
    } else {
        let stage = report.failed_stage.map_or("run", |s| s.as_str());
        let _ = writeln!(
            out,
            "{} {counts}",
            paint(&format!("✗ Bootstrap failed at {stage}:"), Color::Red, true, color)
        );
    }
    out
}

pub fn print_summary(report: &RunReport) {
    print!("{}", render_summary(report, use_color()));
}

/// Stage listing for `aksboot plan`. With `config`, source attribution follows.
#[must_use]
pub fn render_plan(plan: &[PlannedStage], config: Option<&RunConfig>) -> String {
    let mut out = String::new();
    for (index, planned) in plan.iter().enumerate() {
        let criticality = match planned.criticality {
            Criticality::Fatal => "fatal",
            Criticality::BestEffort => "best-effort",
        };
        let _ = writeln!(
            out,
            "{:>2}. {:<22} {:<11} {}",
            index + 1,
            planned.stage.as_str(),
            criticality,
            planned.description
        );
    }

    if let Some(config) = config {
        let _ = writeln!(out);
        let _ = writeln!(out, "Configuration sources:");
        let mut keys: Vec<(&String, &ConfigSource)> = config.source_attribution.iter().collect();
        keys.sort_by_key(|(key, _)| *key);
        for (key, source) in keys {
            let _ = writeln!(out, "  {key:<28} {}", source.as_str());
        }
    }
    out
}

#[must_use]
pub fn render_doctor(report: &DoctorOutput, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", paint("aksboot environment check", Color::Cyan, true, color));
    let _ = writeln!(out, "{}", paint("─────────────────────────", Color::Cyan, true, color));

    let (mut pass, mut warn, mut fail) = (0, 0, 0);
    for check in &report.checks {
        let (symbol, tint) = match check.status {
            CheckStatus::Pass => {
                pass += 1;
                ("✓", Color::Green)
            }
            CheckStatus::Warn => {
                warn += 1;
                ("⚠", Color::Yellow)
            }
            CheckStatus::Fail => {
                fail += 1;
                ("✗", Color::Red)
            }
        };
        let _ = writeln!(
            out,
            "{} {}",
            paint(symbol, tint, true, color),
            paint(&check.name, Color::Reset, true, color)
        );
        let _ = writeln!(out, "  {}", check.details);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{pass} passed, {warn} warnings, {fail} failed");
    out
}

pub fn print_doctor(report: &DoctorOutput) {
    print!("{}", render_doctor(report, use_color()));
}
