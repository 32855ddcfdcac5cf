//! External command execution.
//!
//! Every `docker`/`cpln` invocation is described by an [`ExternalCommand`] and
//! executed through a [`CommandRunner`], so command lines can be inspected
//! without spawning processes.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::debug;

use crate::error::CliError;

/// What to do with one of the child's output streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stream {
    /// Share the parent's stream.
    #[default]
    Inherit,
    /// Send to /dev/null.
    Discard,
    /// Collect into [`CommandOutput`].
    Capture,
}

impl Stream {
    fn stdio(self) -> Stdio {
        match self {
            Stream::Inherit => Stdio::inherit(),
            Stream::Discard => Stdio::null(),
            Stream::Capture => Stdio::piped(),
        }
    }
}

/// A command line to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdout: Stream,
    pub stderr: Stream,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdout: Stream::Inherit,
            stderr: Stream::Inherit,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdout(mut self, stream: Stream) -> Self {
        self.stdout = stream;
        self
    }

    pub fn stderr(mut self, stream: Stream) -> Self {
        self.stderr = stream;
        self
    }

    /// Shorthand for capturing stdout (stderr is left as configured).
    pub fn capture(self) -> Self {
        self.stdout(Stream::Capture)
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"') {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Result of running an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Output of a process that exited with `code` and printed `stdout`.
    pub fn exited(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
        }
    }
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Failing to spawn is an error; a non-zero exit is not.
    async fn run(&self, command: &ExternalCommand) -> Result<CommandOutput, CliError>;
}

/// Spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<CommandOutput, CliError> {
        debug!(command = %command, "running external command");

        let mut process = tokio::process::Command::new(&command.program);
        process
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::inherit())
            .stdout(command.stdout.stdio())
            .stderr(command.stderr.stdio());

        let output = process.output().await.map_err(|source| CliError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        debug!(command = %command, code = ?output.status.code(), "external command finished");

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
