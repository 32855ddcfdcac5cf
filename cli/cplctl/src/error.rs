//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown API token format. Please re-run 'cpln profile login' or set the correct CPLN_TOKEN env variable.")]
    InvalidToken,

    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected API response for {path}: {detail}")]
    UnexpectedResponse { path: String, detail: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Can't run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' failed{}", exit_suffix(.code))]
    CommandFailed { command: String, code: Option<i32> },

    #[error("Failed to parse output of '{command}': {source}")]
    CommandOutput {
        command: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => " (terminated by signal)".to_string(),
    }
}

impl CliError {
    /// Create an API error from response details.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::Api { status, .. } if *status == 401 => {
                eprintln!(
                    "\n{}",
                    "Hint: Your token may have expired. Run `cpln profile login`.".yellow()
                );
            }
            CliError::Api { status, .. } if *status == 403 => {
                eprintln!(
                    "\n{}",
                    "Hint: You may not have permission for this operation.".yellow()
                );
            }
            CliError::Spawn { program, .. } => {
                eprintln!(
                    "\n{}",
                    format!("Hint: Make sure that '{program}' is installed and on your PATH.")
                        .yellow()
                );
            }
            CliError::Network(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check your network connection and CPLN_ENDPOINT.".yellow()
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_mentions_exit_code() {
        let err = CliError::CommandFailed {
            command: "docker push app:1".to_string(),
            code: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "Command 'docker push app:1' failed with exit code 2"
        );
    }

    #[test]
    fn api_error_carries_status_and_body() {
        let err = CliError::api(500, "boom");
        assert_eq!(err.to_string(), "API request failed with status 500: boom");
    }
}
