use std::ffi::OsString;
use std::fmt;
use std::sync::Arc;

use aksboot_cloud::{Cloud, KubectlPortForwarder, PortForwarder};
use aksboot_config::{RunConfig, SecretString};
use aksboot_registry::{HarborConnector, RegistryConnector};
use aksboot_runner::ProcessRunner;
use aksboot_utils::{BootstrapError, PollPolicy};

use crate::state::DiscoveredState;

/// Source of interactively entered secrets.
pub trait SecretPrompt: Send + Sync {
    /// Ask for a secret without echoing it. May block.
    fn read_secret(&self, prompt: &str) -> Result<SecretString, BootstrapError>;
}

/// Everything a stage may use, shared by all stages of one run.
#[derive(Clone)]
pub struct StageContext {
    pub config: Arc<RunConfig>,
    pub cloud: Cloud,
    pub state: Arc<DiscoveredState>,
    pub prompt: Arc<dyn SecretPrompt>,
    pub port_forwarder: Arc<dyn PortForwarder>,
    pub registry: Arc<dyn RegistryConnector>,
    /// Overrides `PATH` for the preflight tool lookup
    pub tool_search_path: Option<OsString>,
}

impl StageContext {
    /// Context with the production port-forwarder and Harbor client.
    #[must_use]
    pub fn new(config: RunConfig, runner: Arc<dyn ProcessRunner>, prompt: Arc<dyn SecretPrompt>) -> Self {
        let cloud = Cloud::new(runner, config.timeouts.command());
        Self {
            config: Arc::new(config),
            cloud,
            state: Arc::new(DiscoveredState::new()),
            prompt,
            port_forwarder: Arc::new(KubectlPortForwarder),
            registry: Arc::new(HarborConnector),
            tool_search_path: None,
        }
    }

    #[must_use]
    pub fn with_port_forwarder(mut self, forwarder: Arc<dyn PortForwarder>) -> Self {
        self.port_forwarder = forwarder;
        self
    }

    #[must_use]
    pub fn with_registry_connector(mut self, connector: Arc<dyn RegistryConnector>) -> Self {
        self.registry = connector;
        self
    }

    #[must_use]
    pub fn with_tool_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.tool_search_path = Some(path.into());
        self
    }

    /// Poll policy with the configured interval and `timeout_secs` as cap.
    #[must_use]
    pub fn policy(&self, timeout_secs: u64) -> PollPolicy {
        self.config.timeouts.policy(timeout_secs)
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("tool_search_path", &self.tool_search_path)
            .finish_non_exhaustive()
    }
}
