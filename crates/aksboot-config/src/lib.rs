//! Run configuration for aksboot
//!
//! [`RunConfig`] is loaded once per run from three layers, lowest precedence first:
//! built-in defaults, an optional TOML file (`--config`), the process environment.
//! Every key remembers which layer it came from ([`ConfigSource`]).

mod config;

pub use aksboot_utils::types::ConfigSource;
pub use config::{
    CROSSPLANE_NAMESPACE, EnvSource, FileConfig, PROVIDER_PREFIX, PayloadPaths, ProcessEnv,
    RunConfig, SecretString, Timeouts,
};
