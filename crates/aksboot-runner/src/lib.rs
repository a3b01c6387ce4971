//! External command execution for the bootstrap pipeline
//!
//! Every call to `az`, `kubectl`, `helm` and `git` goes through this crate.
//!
//! # Security Model
//!
//! All process execution goes through [`CommandSpec`] to ensure argv-style invocation.
//! Arguments cross the process boundary as discrete elements, never as shell strings.
//! Secret values travel either on stdin or as arguments marked secret, which are
//! rendered as `***` whenever a command line is displayed or logged.

pub mod background;
pub mod command_spec;
pub mod error;
pub mod native;
pub mod process;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use background::BackgroundProcess;
pub use command_spec::CommandSpec;
pub use error::RunnerError;
pub use native::NativeRunner;
pub use process::{ProcessOutput, ProcessRunner};
