//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, initializes logging, loads the configuration, creates
//! the tokio runtime and dispatches. It owns all error output.

use clap::Parser;
use tracing::debug;

use aksboot_config::{ProcessEnv, RunConfig};
use aksboot_utils::logging::init_tracing;
use aksboot_utils::{BootstrapError, ExitCode};

use super::args::{Cli, Commands};
use super::commands;

/// Main CLI execution function.
///
/// Returns `Err(ExitCode)` after printing the error; main.rs only maps it to the
/// process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.json) {
        eprintln!("✗ Failed to initialize logging: {e}");
        return Err(ExitCode::INTERNAL);
    }

    let command = cli.command();
    debug!(?command, config_file = ?cli.config, "aksboot starting");

    let config = match RunConfig::load(cli.config.as_deref(), &ProcessEnv) {
        Ok(config) => config,
        Err(e) => {
            let err = BootstrapError::from(e);
            eprintln!("{}", err.display_for_user());
            return Err(ExitCode::from(&err));
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let code = match command {
        Commands::Up => rt.block_on(commands::execute_up(config, cli.json)),
        Commands::Doctor => rt.block_on(commands::execute_doctor(config, cli.json)),
        Commands::Plan => commands::execute_plan(&config, cli.verbose, cli.json),
    };

    if code == ExitCode::SUCCESS {
        Ok(())
    } else {
        Err(code)
    }
}
