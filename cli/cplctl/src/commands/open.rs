//! Open and open-console commands.

use anyhow::{anyhow, bail, Result};
use clap::Args;
use serde_json::Value;

use crate::config::ResolvedApp;

use super::CommandContext;

fn workload_or_default(app: &ResolvedApp, workload: Option<String>) -> Result<String> {
    match workload {
        Some(workload) => Ok(workload),
        None => Ok(app.one_off_workload()?.to_string()),
    }
}

#[derive(Debug, Args)]
pub struct OpenCommand {
    /// Workload to open (defaults to `one_off_workload`).
    #[arg(long, short = 'w')]
    workload: Option<String>,
}

impl OpenCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let workload = workload_or_default(&app, self.workload)?;

        let data = cp.fetch_workload_required(&workload).await?;
        let endpoint = data
            .pointer("/status/endpoint")
            .and_then(Value::as_str)
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| anyhow!("Can't find endpoint for workload '{workload}'."))?;

        ctx.shell.progress(format!("Opening '{endpoint}'..."));
        ctx.cli.open_url(endpoint).await?;
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct OpenConsoleCommand {
    /// Workload to connect to (defaults to `one_off_workload`).
    #[arg(long, short = 'w')]
    workload: Option<String>,

    /// Location (defaults to `default_location`).
    #[arg(long, short = 'l')]
    location: Option<String>,

    /// Container of the workload.
    #[arg(long)]
    container: Option<String>,

    /// Shell to start.
    #[arg(long)]
    shell: Option<String>,
}

impl OpenConsoleCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let location = ctx.location(&app, self.location.as_deref())?;
        let workload = workload_or_default(&app, self.workload)?;

        cp.fetch_workload_required(&workload).await?;

        let replicas = ctx
            .cli
            .workload_get_replicas_safely(&workload, &cp.gvc, &cp.org, location)
            .await?
            .unwrap_or_default();
        if replicas.is_empty() {
            bail!("Can't find any running replica of workload '{workload}' in location '{location}'.");
        }

        ctx.cli
            .workload_connect(
                &workload,
                &cp.gvc,
                &cp.org,
                location,
                self.container.as_deref(),
                self.shell.as_deref(),
            )
            .await?;
        Ok(())
    }
}
