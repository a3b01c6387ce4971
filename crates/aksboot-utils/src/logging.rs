//! Logging and observability for aksboot
//!
//! Structured logging via `tracing`. Every stage runs inside a [`stage_span`], so
//! command and poll events emitted deep inside the cloud wrappers are attributed
//! to the stage that caused them.

use std::io::IsTerminal;
use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Check if colored output should be used.
///
/// Returns true only if stderr is a terminal and `NO_COLOR` is not set.
#[must_use]
pub fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` selects `debug` for aksboot crates
/// (which includes every executed command line, secrets masked) and `info` else.
/// `json` switches to newline-delimited JSON events for log shipping.
///
/// Logs go to stderr; stdout is reserved for the summary and JSON reports.
pub fn init_tracing(verbose: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("aksboot=debug,aksboot_=debug,info")
            } else {
                EnvFilter::try_new("info")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(use_color())
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(use_color())
                    .with_target(false)
                    .without_time()
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping the execution of one stage.
pub fn stage_span(stage: &str, index: usize, total: usize) -> tracing::Span {
    span!(Level::INFO, "stage", stage = %stage, step = %format!("{index}/{total}"))
}

pub fn log_stage_start(stage: &str, description: &str) {
    info!(stage = %stage, "▶ {description}");
}

pub fn log_stage_complete(stage: &str, duration_ms: u64) {
    info!(stage = %stage, duration_ms, "✔ done");
}

pub fn log_stage_skipped(stage: &str, reason: &str, duration_ms: u64) {
    info!(stage = %stage, duration_ms, "↷ already satisfied: {reason}");
}

pub fn log_stage_warned(stage: &str, warning: &str, duration_ms: u64) {
    warn!(stage = %stage, duration_ms, "⚠ {warning}");
}

pub fn log_stage_failed(stage: &str, error: &str, duration_ms: u64) {
    error!(stage = %stage, duration_ms, error = %error, "✖ stage failed");
}
