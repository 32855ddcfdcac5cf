//! Copy-image-from-upstream and promote-app-from-upstream commands.

use anyhow::{bail, Result};
use clap::Args;

use crate::config::ResolvedApp;
use crate::cpln::{registry_host, CplnCli};
use crate::error::CliError;
use crate::images;
use crate::platform::Platform;

use super::deploy_image::DeployImageCommand;
use super::CommandContext;

/// Copy the upstream app's image into the current app's registry.
async fn copy_image_from_upstream(
    ctx: &CommandContext,
    app: &ResolvedApp,
    cp: &Platform<'_>,
    upstream_token: Option<&str>,
    image: Option<&str>,
) -> Result<()> {
    let upstream = ctx.config.resolve(app.upstream()?)?;
    let upstream_org = upstream.cpln_org()?;

    let profile = upstream_token.map(|_| format!("cpl-upstream-{}", upstream.name));
    let upstream_cli = match (&profile, upstream_token) {
        (Some(profile), Some(token)) => {
            if ctx.cli.profile_exists(profile).await? {
                ctx.cli.profile_delete(profile).await?;
            }
            ctx.cli.profile_create(profile, token).await?;
            ctx.cli.with_profile(profile.as_str())
        }
        _ => ctx.cli.clone(),
    };

    let copied = copy_image(ctx, cp, &upstream, upstream_org, &upstream_cli, image).await;

    if let Some(profile) = &profile {
        ctx.cli.profile_delete(profile).await?;
    }
    copied
}

async fn copy_image(
    ctx: &CommandContext,
    cp: &Platform<'_>,
    upstream: &ResolvedApp,
    upstream_org: &str,
    upstream_cli: &CplnCli,
    image: Option<&str>,
) -> Result<()> {
    let upstream_image = ctx
        .step("Fetching upstream image URL", async {
            if let Some(image) = image {
                return Ok::<_, CliError>(image.to_string());
            }
            let records = upstream_cli.image_query(&upstream.name, upstream_org).await?;
            Ok(images::latest_image_name(&upstream.name, &records))
        })
        .await?;
    if upstream_image.ends_with(images::NO_IMAGE_AVAILABLE) {
        bail!("Can't find any image for upstream app '{}'.", upstream.name);
    }
    let upstream_url = format!("{}/{upstream_image}", registry_host(upstream_org));

    let app_image = ctx
        .step("Fetching app image URL", cp.next_image())
        .await?;
    let app_url = format!("{}/{app_image}", registry_host(&cp.org));

    ctx.step(&format!("Pulling image from '{upstream_url}'"), async {
        upstream_cli.image_login(upstream_org).await?;
        upstream_cli.image_pull(&upstream_url).await
    })
    .await?;

    ctx.step(&format!("Pushing image to '{app_url}'"), async {
        ctx.cli.image_login(&cp.org).await?;
        ctx.cli.image_tag(&upstream_url, &app_url).await?;
        ctx.cli.image_push(&app_url).await
    })
    .await?;

    Ok(())
}

#[derive(Debug, Args)]
pub struct CopyImageFromUpstreamCommand {
    /// Token for the upstream org, used through a temporary `cpln` profile.
    #[arg(long, short = 't')]
    upstream_token: Option<String>,

    /// Upstream image to copy (defaults to the latest one).
    #[arg(long, short = 'i')]
    image: Option<String>,
}

impl CopyImageFromUpstreamCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        copy_image_from_upstream(
            ctx,
            &app,
            &cp,
            self.upstream_token.as_deref(),
            self.image.as_deref(),
        )
        .await
    }
}

#[derive(Debug, Args)]
pub struct PromoteAppFromUpstreamCommand {
    /// Token for the upstream org, used through a temporary `cpln` profile.
    #[arg(long, short = 't')]
    upstream_token: Option<String>,
}

impl PromoteAppFromUpstreamCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        copy_image_from_upstream(ctx, &app, &cp, self.upstream_token.as_deref(), None).await?;

        ctx.shell.blank();
        DeployImageCommand {}.run(ctx).await
    }
}
