//! Latest-image command.

use anyhow::Result;
use clap::Args;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct LatestImageCommand {}

impl LatestImageCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (_, cp) = ctx.platform()?;
        ctx.shell.puts(cp.latest_image().await?);
        Ok(())
    }
}
