//! Test doubles for stage contexts

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aksboot_cloud::{PortForward, PortForwarder};
use aksboot_config::{RunConfig, SecretString};
use aksboot_runner::ProcessRunner;
use aksboot_utils::BootstrapError;

use crate::{SecretPrompt, StageContext};

/// Prompt answering with a fixed value and counting how often it was asked.
#[derive(Debug, Default)]
pub struct FixedPrompt {
    answer: String,
    asked: AtomicUsize,
}

impl FixedPrompt {
    #[must_use]
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            asked: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl SecretPrompt for FixedPrompt {
    fn read_secret(&self, _prompt: &str) -> Result<SecretString, BootstrapError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(SecretString::new(self.answer.clone()))
    }
}

/// Port-forwarder that hands out unmanaged tunnels on a fixed port.
#[derive(Debug, Default)]
pub struct NoopForwarder {
    opened: AtomicUsize,
}

impl NoopForwarder {
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl PortForwarder for NoopForwarder {
    fn forward(&self, _namespace: &str, _target: &str, _remote_port: u16) -> Result<PortForward, BootstrapError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(PortForward::unmanaged(18080))
    }
}

/// Context over `runner` with a 1s poll interval and no real tunnels.
#[must_use]
pub fn test_context(config: RunConfig, runner: Arc<dyn ProcessRunner>) -> StageContext {
    let mut config = config;
    config.timeouts.poll_interval_secs = 1;
    StageContext::new(config, runner, Arc::new(FixedPrompt::new("db-password")))
        .with_port_forwarder(Arc::new(NoopForwarder::default()))
}
