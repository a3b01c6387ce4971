//! CLI argument definitions and parsing structures

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// aksboot - idempotent AKS platform bootstrap
#[derive(Debug, Parser)]
#[command(name = "aksboot")]
#[command(about = "Idempotently bootstrap an AKS cluster with Crossplane, Harbor and Argo CD")]
#[command(long_about = r#"
aksboot provisions an Azure resource group, an AKS cluster and a container registry,
then installs ingress, Crossplane (with workload-identity-bound providers), Harbor
and Argo CD. Every stage checks before it changes anything, so it is safe to re-run
after a failure.

EXAMPLES:
  # Check the workstation: az, kubectl, helm, git and the az login
  aksboot doctor

  # Show the stages, their criticality and where each setting comes from
  aksboot plan --verbose

  # Run the bootstrap with a different resource group
  RESOURCE_GROUP=team-rg aksboot up

  # Machine-readable run report
  aksboot up --json > report.json

CONFIGURATION:
  Precedence: environment > --config file > built-in defaults
  Environment: RESOURCE_GROUP, CLUSTER_NAME, LOCATION, K8S_VERSION, NODE_COUNT,
  NODE_VM_SIZE, ACR_NAME, IDENTITY_NAME, HARBOR_ADMIN_PASSWORD, APP_NAMESPACE,
  REPO_ROOT, GIT_PUSH, DB_ADMIN_PASSWORD

EXIT CODES:
  0 success, 2 configuration, 3 missing tool, 4 not logged in, 5 stage failed,
  6 missing input, 10 timeout, 130 interrupted
"#)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Enable verbose output (debug logs, including executed commands)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit reports as canonical JSON on stdout and logs as JSON on stderr
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// The subcommand to run; `up` when none was given.
    #[must_use]
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Up)
    }
}

/// Available CLI commands
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run the bootstrap pipeline (default)
    Up,

    /// Check required tools and the Azure login without changing anything
    Doctor,

    /// List the pipeline stages in execution order
    ///
    /// With --verbose, also lists the source (default, config, env) of every setting.
    Plan,
}

/// Build the CLI command structure without parsing arguments
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
