//! Scripted process runner for tests
//!
//! [`ScriptedRunner`] answers commands by argv prefix and records every call, so
//! stage and wrapper tests can run without `az`, `kubectl` or `helm` installed.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::{CommandSpec, ProcessOutput, ProcessRunner, RunnerError};

type Handler = Box<dyn Fn(&CommandSpec) -> ProcessOutput + Send + Sync>;

struct Rule {
    prefix: Vec<String>,
    handler: Handler,
}

/// Process runner that dispatches on argv prefixes.
///
/// Rules are checked newest first, so a later `on` can override an earlier one.
/// A command matching no rule fails with [`RunnerError::SpawnFailed`], which makes
/// unexpected calls loud in tests.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command starting with `prefix` through `handler`.
    pub fn on<F>(&self, prefix: &[&str], handler: F) -> &Self
    where
        F: Fn(&CommandSpec) -> ProcessOutput + Send + Sync + 'static,
    {
        self.rules
            .lock()
            .expect("rules lock poisoned")
            .push(Rule {
                prefix: prefix.iter().map(|s| (*s).to_string()).collect(),
                handler: Box::new(handler),
            });
        self
    }

    /// Answer every command starting with `prefix` with a fixed output.
    pub fn respond(&self, prefix: &[&str], output: ProcessOutput) -> &Self {
        self.on(prefix, move |_| output.clone())
    }

    /// All calls so far, rendered as argv vectors.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .iter()
            .map(CommandSpec::argv)
            .collect()
    }

    /// All recorded specs, including stdin payloads.
    #[must_use]
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    /// Calls whose argv starts with `prefix`.
    #[must_use]
    pub fn calls_matching(&self, prefix: &[&str]) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|argv| starts_with(argv, prefix))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock poisoned").clear();
    }
}

fn starts_with<S: AsRef<str>>(argv: &[String], prefix: &[S]) -> bool {
    argv.len() >= prefix.len()
        && argv
            .iter()
            .zip(prefix.iter())
            .all(|(a, p)| a == p.as_ref())
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, cmd: &CommandSpec, _timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(cmd.clone());

        let argv = cmd.argv();
        let rules = self.rules.lock().expect("rules lock poisoned");
        match rules
            .iter()
            .rev()
            .find(|rule| starts_with(&argv, &rule.prefix))
        {
            Some(rule) => Ok((rule.handler)(cmd)),
            None => Err(RunnerError::SpawnFailed {
                program: cmd.program_name(),
                reason: format!("no scripted response for `{}`", cmd.display()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_newest_rule_wins_and_calls_are_recorded() {
        let runner = ScriptedRunner::new();
        runner
            .respond(&["az", "group"], ProcessOutput::ok("first"))
            .respond(&["az", "group", "exists"], ProcessOutput::ok("false"));

        let out = runner
            .run(
                &CommandSpec::new("az").args(["group", "exists", "-n", "rg"]),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout_string(), "false");
        assert_eq!(runner.calls_matching(&["az", "group"]).len(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_command_is_an_error() {
        let runner = ScriptedRunner::new();
        let result = runner
            .run(&CommandSpec::new("helm").arg("list"), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(RunnerError::SpawnFailed { .. })));
        assert_eq!(runner.calls().len(), 1);
    }
}
