//! Foundation utilities shared by every aksboot crate
//!
//! - [`error`]: the two-tier error taxonomy and user-facing reporting
//! - [`exit_codes`]: process exit codes
//! - [`poll`]: bounded poll-with-timeout used by every wait in the pipeline
//! - [`discovery`]: name discovery on top of [`poll`]
//! - [`retry`]: backoff retries for actions that fail while a dependency converges
//! - [`logging`]: tracing initialization and stage spans
//! - [`canonicalization`]: canonical JSON emission for reports
//! - [`types`]: doctor output and configuration source attribution

pub mod canonicalization;
pub mod discovery;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod poll;
pub mod retry;
pub mod types;

pub use error::{BootstrapError, ConfigError, UserFriendlyError};
pub use exit_codes::ExitCode;
pub use poll::{PollOutcome, PollPolicy, poll_until};
pub use types::ConfigSource;
pub use retry::{RetryPolicy, retry_with_backoff};
