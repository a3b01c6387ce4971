//! CLI tests module
//!
//! Argument parsing and plan rendering.

use super::*;
use aksboot_config::RunConfig;
use clap::Parser;
use std::collections::HashMap;

#[test]
fn test_up_is_the_default_command() {
    let cli = Cli::try_parse_from(["aksboot"]).unwrap();
    assert_eq!(cli.command(), Commands::Up);
    assert!(!cli.json);
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["aksboot", "doctor", "--json", "--config", "boot.toml", "-v"]).unwrap();
    assert_eq!(cli.command(), Commands::Doctor);
    assert!(cli.json);
    assert!(cli.verbose);
    assert_eq!(cli.config.as_deref().map(|p| p.as_str()), Some("boot.toml"));
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["aksboot", "destroy"]).is_err());
}

#[test]
fn test_cli_definition_is_consistent() {
    build_cli().debug_assert();
}

#[test]
fn test_verbose_plan_lists_config_sources() {
    let env = HashMap::from([("CLUSTER_NAME", "team-aks")]);
    let config = RunConfig::load(None, &env).unwrap();

    let text = aksboot_orchestrator::summary::render_plan(
        &aksboot_orchestrator::Sequencer::bootstrap().plan(),
        Some(&config),
    );

    assert!(text.contains(" 1. preflight"));
    assert!(text.contains("21. connection-secret"));
    let cluster = text
        .lines()
        .find(|l| l.trim_start().starts_with("cluster_name"))
        .unwrap();
    assert!(cluster.ends_with("env"));
    let group = text
        .lines()
        .find(|l| l.trim_start().starts_with("resource_group"))
        .unwrap();
    assert!(group.ends_with("default"));
}
