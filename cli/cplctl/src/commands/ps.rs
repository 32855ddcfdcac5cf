//! Workload process commands (`ps`, `ps:start`, `ps:stop`, `ps:restart`, `ps:wait`).

use anyhow::Result;
use clap::Args;

use crate::config::ResolvedApp;

use super::CommandContext;

/// The workload given with `--workload`, or all workloads of the app.
fn selected_workloads(app: &ResolvedApp, workload: Option<String>) -> Result<Vec<String>> {
    match workload {
        Some(workload) => Ok(vec![workload]),
        None => Ok(app.all_workloads()?),
    }
}

#[derive(Debug, Args)]
pub struct PsCommand {
    /// Name of one workload (defaults to all app and additional workloads).
    #[arg(long, short = 'w')]
    workload: Option<String>,

    /// Location (defaults to `default_location`).
    #[arg(long, short = 'l')]
    location: Option<String>,
}

impl PsCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let location = ctx.location(&app, self.location.as_deref())?;

        for workload in selected_workloads(&app, self.workload.clone())? {
            cp.fetch_workload_required(&workload).await?;

            let replicas = ctx
                .cli
                .workload_get_replicas(&workload, &cp.gvc, &cp.org, location)
                .await?;
            for replica in replicas {
                ctx.shell.puts(replica);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PsStartCommand {
    /// Name of one workload (defaults to all app and additional workloads).
    #[arg(long, short = 'w')]
    workload: Option<String>,

    /// Wait until the workloads are ready.
    #[arg(long)]
    wait: bool,
}

impl PsStartCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let workloads = selected_workloads(&app, self.workload)?;

        for workload in &workloads {
            ctx.step(
                &format!("Starting workload '{workload}'"),
                cp.set_workload_suspend(workload, false),
            )
            .await?;
        }

        if self.wait {
            ctx.shell.blank();
            for workload in &workloads {
                ctx.step_until(
                    &format!("Waiting for workload '{workload}' to be ready"),
                    || cp.workload_deployments_ready(workload, true),
                )
                .await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PsStopCommand {
    /// Name of one workload (defaults to all app and additional workloads).
    #[arg(long, short = 'w')]
    workload: Option<String>,

    /// Wait until the workloads are not ready.
    #[arg(long)]
    wait: bool,
}

impl PsStopCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let workloads = selected_workloads(&app, self.workload)?;

        for workload in &workloads {
            ctx.step(
                &format!("Stopping workload '{workload}'"),
                cp.set_workload_suspend(workload, true),
            )
            .await?;
        }

        if self.wait {
            ctx.shell.blank();
            for workload in &workloads {
                ctx.step_until(
                    &format!("Waiting for workload '{workload}' to be not ready"),
                    || cp.workload_deployments_ready(workload, false),
                )
                .await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PsRestartCommand {
    /// Name of one workload (defaults to all app and additional workloads).
    #[arg(long, short = 'w')]
    workload: Option<String>,
}

impl PsRestartCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;

        for workload in selected_workloads(&app, self.workload)? {
            cp.fetch_workload_required(&workload).await?;
            ctx.step(
                &format!("Restarting workload '{workload}'"),
                ctx.cli
                    .workload_force_redeployment(&workload, &cp.gvc, &cp.org),
            )
            .await?;
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PsWaitCommand {
    /// Name of one workload (defaults to all app and additional workloads).
    #[arg(long, short = 'w')]
    workload: Option<String>,
}

impl PsWaitCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;

        for workload in selected_workloads(&app, self.workload)? {
            ctx.step_until(
                &format!("Waiting for workload '{workload}' to be ready"),
                || cp.workload_deployments_ready(&workload, true),
            )
            .await?;
        }
        Ok(())
    }
}
