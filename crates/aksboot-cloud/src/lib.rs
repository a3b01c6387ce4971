//! Typed access to the external systems the bootstrap drives
//!
//! Every call goes through a [`ProcessRunner`](aksboot_runner::ProcessRunner), so the
//! whole crate runs against a scripted runner in tests. Wrappers return parsed
//! models and distinguish "not found" (an answer) from failures (an error).

pub mod az;
pub mod exec;
pub mod git;
pub mod helm;
pub mod kubectl;
pub mod models;
pub mod provision;

use std::sync::Arc;
use std::time::Duration;

use aksboot_runner::ProcessRunner;

pub use az::Az;
pub use exec::Exec;
pub use git::Git;
pub use helm::{Helm, HelmRelease};
pub use kubectl::{Kubectl, KubectlPortForwarder, PortForward, PortForwarder};
pub use provision::{Provisioned, ensure};

/// All command-line clients, sharing one runner and command timeout.
#[derive(Clone)]
pub struct Cloud {
    pub az: Az,
    pub kubectl: Kubectl,
    pub helm: Helm,
    pub git: Git,
}

impl Cloud {
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>, command_timeout: Duration) -> Self {
        let exec = Exec::new(runner, command_timeout);
        Self {
            az: Az::new(exec.clone()),
            kubectl: Kubectl::new(exec.clone()),
            helm: Helm::new(exec.clone()),
            git: Git::new(exec),
        }
    }
}
