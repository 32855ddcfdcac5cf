//! Console output shared by all commands.
//!
//! Results go to stdout; progress lines, warnings and step markers go to
//! stderr so that command output stays pipeable.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;

/// Asks the user yes/no questions.
pub trait Prompter: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Interactive prompt on the terminal.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

type Sink = Mutex<Box<dyn Write + Send>>;

pub struct Shell {
    out: Sink,
    progress: Sink,
    prompter: Box<dyn Prompter>,
}

impl Shell {
    pub fn new(
        out: Box<dyn Write + Send>,
        progress: Box<dyn Write + Send>,
        prompter: Box<dyn Prompter>,
    ) -> Self {
        Self {
            out: Mutex::new(out),
            progress: Mutex::new(progress),
            prompter,
        }
    }

    /// Shell bound to the process's stdout/stderr and terminal.
    pub fn stdio() -> Self {
        Self::new(
            Box::new(io::stdout()),
            Box::new(io::stderr()),
            Box::new(TerminalPrompter),
        )
    }

    /// Print a result line to stdout.
    pub fn puts(&self, line: impl Display) {
        write_to(&self.out, &format!("{line}\n"));
    }

    /// Print a progress line to stderr.
    pub fn progress(&self, line: impl Display) {
        write_to(&self.progress, &format!("{line}\n"));
    }

    /// Print progress text without a trailing newline.
    pub fn progress_inline(&self, text: impl Display) {
        write_to(&self.progress, &text.to_string());
    }

    /// Print an empty progress line.
    pub fn blank(&self) {
        self.progress("");
    }

    pub fn warn(&self, message: &str) {
        self.progress(format!("{} {}", "WARNING:".yellow().bold(), message.yellow()));
    }

    pub fn warn_deprecated(&self, message: &str) {
        self.progress(format!("DEPRECATED: {message}").as_str().yellow());
    }

    /// Ask for confirmation.
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        self.prompter.confirm(prompt)
    }
}

fn write_to(sink: &Sink, text: &str) {
    let mut writer = sink.lock().unwrap_or_else(PoisonError::into_inner);
    // Nothing sensible to do if the terminal went away.
    let _ = writer.write_all(text.as_bytes());
    let _ = writer.flush();
}

/// Marker printed after a successful step.
pub fn done() -> String {
    "done!".green().to_string()
}

/// Marker printed after a failed step.
pub fn failed() -> String {
    "failed!".red().to_string()
}
