//! Delete command.

use anyhow::Result;
use clap::Args;

use crate::images;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Skip delete confirmation.
    #[arg(long, short = 'y')]
    yes: bool,
}

impl DeleteCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;

        if !self.yes {
            let prompt = format!("Are you sure you want to delete '{}'?", app.name);
            if !ctx.shell.confirm(&prompt)? {
                return Ok(());
            }
            ctx.shell.blank();
        }

        if cp.fetch_gvc().await?.is_none() {
            ctx.shell
                .progress(format!("App '{}' does not exist.", app.name));
        } else {
            ctx.step(
                &format!("Deleting app '{}'", app.name),
                cp.gvc_delete(&cp.gvc),
            )
            .await?;
        }

        let images: Vec<String> = cp
            .images(&app.name)
            .await?
            .into_iter()
            .filter(|image| images::belongs_to(&image.name, &app.name))
            .map(|image| image.name)
            .collect();

        if images.is_empty() {
            ctx.shell.progress("No images to delete.");
            return Ok(());
        }

        for image in &images {
            ctx.step(&format!("Deleting image '{image}'"), cp.image_delete(image))
                .await?;
        }
        Ok(())
    }
}
