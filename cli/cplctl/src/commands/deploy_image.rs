//! Deploy-image command.

use anyhow::{bail, Result};
use clap::Args;
use serde_json::Value;

use crate::cpln::image_link;
use crate::images;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct DeployImageCommand {}

impl DeployImageCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;

        let image = cp.latest_image().await?;
        if image.ends_with(images::NO_IMAGE_AVAILABLE) {
            bail!(
                "Can't find any image for app '{}', please build one with 'cpl build-image -a {}'.",
                app.name,
                app.name
            );
        }

        // Only containers running an image of this app are updated.
        let own_images = format!("{}:", image_link(&cp.org, &app.name));
        let mut endpoints: Vec<(String, String)> = Vec::new();

        for workload in app.app_workloads()? {
            let data = cp.fetch_workload_required(workload).await?;
            let containers = data
                .pointer("/spec/containers")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for container in containers {
                let current = container.get("image").and_then(Value::as_str).unwrap_or_default();
                if !current.starts_with(&own_images) {
                    continue;
                }

                let name = container.get("name").and_then(Value::as_str).unwrap_or_default();
                ctx.step(
                    &format!("Deploying image '{image}' for workload '{name}'"),
                    ctx.cli
                        .workload_set_image_ref(workload, &cp.gvc, &cp.org, name, &image),
                )
                .await?;

                let endpoint = data
                    .pointer("/status/endpoint")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                endpoints.push((name.to_string(), endpoint.to_string()));
            }
        }

        if endpoints.is_empty() {
            ctx.shell.warn(&format!(
                "No container of the app workloads runs an image of app '{}'.",
                app.name
            ));
            return Ok(());
        }

        ctx.shell.blank();
        ctx.shell.progress("Deployed endpoints:");
        for (name, endpoint) in endpoints {
            ctx.shell.progress(format!("  - {name}: {endpoint}"));
        }
        Ok(())
    }
}
