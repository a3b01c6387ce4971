//! Hidden terminal input for secrets

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, BufRead, IsTerminal, Write};

use aksboot_config::SecretString;
use aksboot_stage_api::SecretPrompt;
use aksboot_utils::BootstrapError;

/// Reads secrets from the controlling terminal without echo.
///
/// When stdin is not a terminal (piped input in CI) one line is read from stdin
/// instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

enum Input {
    Line(String),
    Interrupted,
}

impl TerminalPrompt {
    fn read_hidden(prompt: &str) -> Result<Input> {
        let mut stderr = io::stderr();
        write!(stderr, "{prompt}: ")?;
        stderr.flush()?;

        enable_raw_mode().context("Failed to enable raw mode")?;
        let result = Self::collect_keys();
        disable_raw_mode().context("Failed to disable raw mode")?;
        writeln!(stderr)?;
        result
    }

    fn collect_keys() -> Result<Input> {
        let mut buffer = String::new();
        loop {
            let Event::Key(key) = event::read().context("Failed to read terminal input")? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Enter => return Ok(Input::Line(buffer)),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(Input::Interrupted);
                }
                KeyCode::Char(c) => buffer.push(c),
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Esc => return Ok(Input::Interrupted),
                _ => {}
            }
        }
    }

    fn read_line() -> Result<Input> {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read secret from stdin")?;
        Ok(Input::Line(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl SecretPrompt for TerminalPrompt {
    fn read_secret(&self, prompt: &str) -> Result<SecretString, BootstrapError> {
        let input = if io::stdin().is_terminal() {
            Self::read_hidden(prompt)
        } else {
            Self::read_line()
        };
        match input {
            Ok(Input::Line(value)) => Ok(SecretString::new(value)),
            Ok(Input::Interrupted) => Err(BootstrapError::Interrupted),
            Err(e) => Err(io::Error::other(format!("{e:#}")).into()),
        }
    }
}
