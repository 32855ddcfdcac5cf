//! cplctl (cpl) - CLI for apps on Control Plane
//!
//! Wraps the `cpln` CLI, `docker` and the Control Plane REST API behind
//! app-level commands driven by `.controlplane/controlplane.yml`.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod client;
mod commands;
mod config;
mod cpln;
mod error;
mod external;
mod images;
mod platform;
mod retry;
mod routing;
mod shell;

#[cfg(test)]
mod testing;

use commands::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with command output.
    let default_level = if cli.verbose() { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            error::print_error(&e);
            ExitCode::FAILURE
        }
    }
}
