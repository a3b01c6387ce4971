use std::collections::{BTreeSet, HashMap};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use tokio::process::Command as TokioCommand;

// ============================================================================
// CommandSpec - argv-style process specification
// ============================================================================

/// Specification for a command to execute.
///
/// All process execution goes through this type to ensure argv-style invocation.
/// Secret arguments (for example a Helm `--set` carrying an admin password) are
/// added with [`CommandSpec::secret_arg`] and never appear in [`CommandSpec::display`].
///
/// # Example
///
/// ```rust
/// use aksboot_runner::CommandSpec;
/// use std::ffi::OsString;
///
/// let cmd = CommandSpec::new("az")
///     .args(["group", "exists", "--name"])
///     .arg("gws-rg");
///
/// assert_eq!(cmd.program, OsString::from("az"));
/// assert_eq!(cmd.args.len(), 4);
/// assert_eq!(cmd.display(), "az group exists --name gws-rg");
/// ```
#[derive(Clone, Default)]
pub struct CommandSpec {
    /// The program to execute
    pub program: OsString,
    /// Arguments as discrete elements (NOT shell strings)
    pub args: Vec<OsString>,
    /// Indices into `args` that must be masked when displayed
    pub secret_args: BTreeSet<usize>,
    /// Optional working directory
    pub cwd: Option<PathBuf>,
    /// Optional environment overrides
    pub env: Option<HashMap<OsString, OsString>>,
    /// Optional payload written to the child's stdin
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    /// Create a new `CommandSpec` with the given program.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Add a single argument to the command.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an argument that is masked in every rendered command line.
    #[must_use]
    pub fn secret_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.secret_args.insert(self.args.len());
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments to the command.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the command.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set an environment variable for the command.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Feed `payload` to the child's stdin.
    ///
    /// Used for `kubectl apply -f -` so manifests carrying secrets never touch argv
    /// or the filesystem.
    #[must_use]
    pub fn stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Program name as a lossy UTF-8 string.
    #[must_use]
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Arguments as lossy UTF-8 strings, secrets included.
    ///
    /// Meant for matching in tests and fakes; use [`CommandSpec::display`] for output.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program_name())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect()
    }

    /// Render the command line with secret arguments masked.
    #[must_use]
    pub fn display(&self) -> String {
        let mut rendered = self.program_name();
        for (idx, arg) in self.args.iter().enumerate() {
            rendered.push(' ');
            if self.secret_args.contains(&idx) {
                rendered.push_str(&mask(&arg.to_string_lossy()));
            } else {
                rendered.push_str(&arg.to_string_lossy());
            }
        }
        rendered
    }

    /// Convert this `CommandSpec` into a `tokio::process::Command`.
    #[must_use]
    pub fn to_tokio_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        if let Some(ref env) = self.env {
            for (key, value) in env {
                cmd.env(key, value);
            }
        }

        cmd
    }
}

/// Mask a secret argument, keeping a `key=` prefix so `--set` pairs stay readable.
fn mask(arg: &str) -> String {
    match arg.split_once('=') {
        Some((key, _)) => format!("{key}=***"),
        None => "***".to_string(),
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.display())
            .field("cwd", &self.cwd)
            .field("stdin_bytes", &self.stdin.as_ref().map(Vec::len))
            .finish()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
