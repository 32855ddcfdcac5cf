//! Maintenance mode commands.
//!
//! Maintenance mode is on when the app's domain routes `/` to the
//! maintenance workload instead of the one-off workload.

use anyhow::{anyhow, Result};
use clap::Args;
use serde_json::Value;

use crate::config::ResolvedApp;
use crate::error::CliError;
use crate::platform::Platform;
use crate::routing;

use super::CommandContext;

const NO_DOMAIN: &str = "Can't find domain. Maintenance mode is only supported for domains that use path based routing mode and have a route configured for the prefix '/' on either port 80 or 443.";

/// Domain routed to the one-off or maintenance workload.
async fn find_domain(app: &ResolvedApp, cp: &Platform<'_>) -> Result<Value> {
    let workloads = [
        app.one_off_workload()?.to_string(),
        app.maintenance_workload().to_string(),
    ];
    cp.find_domain_for(&workloads)
        .await?
        .ok_or_else(|| anyhow!(NO_DOMAIN))
}

/// Route the domain to `workload` and wait for the change to propagate.
async fn switch_domain(
    ctx: &CommandContext,
    cp: &Platform<'_>,
    domain: &mut Value,
    workload: &str,
) -> Result<(), CliError> {
    cp.set_domain_workload(domain, workload).await?;
    tokio::time::sleep(ctx.domain_settle).await;
    Ok(())
}

#[derive(Debug, Args)]
pub struct MaintenanceCommand {}

impl MaintenanceCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let domain = find_domain(&app, &cp).await?;

        let enabled = routing::route_workload(&domain) == Some(app.maintenance_workload());
        ctx.shell.puts(if enabled { "on" } else { "off" });
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct MaintenanceOnCommand {}

impl MaintenanceOnCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let maintenance = app.maintenance_workload();
        let workloads = app.all_workloads()?;

        let mut domain = find_domain(&app, &cp).await?;
        if routing::route_workload(&domain) == Some(maintenance) {
            ctx.shell.progress(format!(
                "Maintenance mode is already enabled for app '{}'.",
                app.name
            ));
            return Ok(());
        }

        cp.fetch_workload_required(maintenance).await?;

        ctx.step(
            &format!("Starting workload '{maintenance}'"),
            cp.set_workload_suspend(maintenance, false),
        )
        .await?;
        ctx.shell.blank();

        ctx.step_until(
            &format!("Waiting for workload '{maintenance}' to be ready"),
            || cp.workload_deployments_ready(maintenance, true),
        )
        .await?;
        ctx.shell.blank();

        let domain_name = routing::domain_name(&domain).to_string();
        ctx.step(
            &format!("Switching workload for domain '{domain_name}' to '{maintenance}'"),
            switch_domain(ctx, &cp, &mut domain, maintenance),
        )
        .await?;
        ctx.shell.blank();

        for workload in &workloads {
            ctx.step(
                &format!("Stopping workload '{workload}'"),
                cp.set_workload_suspend(workload, true),
            )
            .await?;
        }
        ctx.shell.blank();

        for workload in &workloads {
            ctx.step_until(
                &format!("Waiting for workload '{workload}' to be not ready"),
                || cp.workload_deployments_ready(workload, false),
            )
            .await?;
        }
        ctx.shell.blank();

        ctx.shell
            .progress(format!("Maintenance mode enabled for app '{}'.", app.name));
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct MaintenanceOffCommand {}

impl MaintenanceOffCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let one_off = app.one_off_workload()?;
        let maintenance = app.maintenance_workload();
        let workloads = app.all_workloads()?;

        let mut domain = find_domain(&app, &cp).await?;
        if routing::route_workload(&domain) == Some(one_off) {
            ctx.shell.progress(format!(
                "Maintenance mode is already disabled for app '{}'.",
                app.name
            ));
            return Ok(());
        }

        cp.fetch_workload_required(maintenance).await?;

        for workload in &workloads {
            ctx.step(
                &format!("Starting workload '{workload}'"),
                cp.set_workload_suspend(workload, false),
            )
            .await?;
        }
        ctx.shell.blank();

        for workload in &workloads {
            ctx.step_until(
                &format!("Waiting for workload '{workload}' to be ready"),
                || cp.workload_deployments_ready(workload, true),
            )
            .await?;
        }
        ctx.shell.blank();

        let domain_name = routing::domain_name(&domain).to_string();
        ctx.step(
            &format!("Switching workload for domain '{domain_name}' to '{one_off}'"),
            switch_domain(ctx, &cp, &mut domain, one_off),
        )
        .await?;
        ctx.shell.blank();

        ctx.step(
            &format!("Stopping workload '{maintenance}'"),
            cp.set_workload_suspend(maintenance, true),
        )
        .await?;
        ctx.shell.blank();

        ctx.step_until(
            &format!("Waiting for workload '{maintenance}' to be not ready"),
            || cp.workload_deployments_ready(maintenance, false),
        )
        .await?;
        ctx.shell.blank();

        ctx.shell
            .progress(format!("Maintenance mode disabled for app '{}'.", app.name));
        Ok(())
    }
}
