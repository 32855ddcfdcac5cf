//! Build-image command.

use anyhow::{bail, Result};
use clap::Args;

use crate::cpln::{image_link, registry_host};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct BuildImageCommand {
    /// Commit hash, passed to the build as `GIT_COMMIT`.
    #[arg(long, short = 'c')]
    commit: Option<String>,
}

impl BuildImageCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;

        if !ctx.cli.docker_available().await? {
            bail!("Can't run Docker. Please make sure that it's installed and started, then try again.");
        }

        let dockerfile = ctx.config.app_cpln_dir().join(app.dockerfile());
        if !dockerfile.is_file() {
            bail!("Can't find Dockerfile at '{}'.", dockerfile.display());
        }

        ctx.shell.progress(format!(
            "Building image from Dockerfile '{}'...",
            dockerfile.display()
        ));
        ctx.shell.blank();

        let image = cp.next_image().await?;
        let image_url = format!("{}/{image}", registry_host(&cp.org));
        let build_args: Vec<String> = self
            .commit
            .iter()
            .map(|commit| format!("GIT_COMMIT={commit}"))
            .collect();

        ctx.cli.image_login(&cp.org).await?;
        ctx.cli
            .image_build(&image_url, &dockerfile, &build_args, ctx.config.app_dir())
            .await?;
        ctx.cli.image_push(&image_url).await?;

        ctx.shell.blank();
        ctx.shell
            .progress(format!("Pushed image to '{}'.", image_link(&cp.org, &image)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::CommandOutput;
    use crate::testing::{context, ScriptedPrompter, CONFIG};
    use wiremock::MockServer;

    const IMAGES: &str = "items:\n  - name: my-app-staging:1\n  - name: my-app-staging:2\n";

    #[tokio::test]
    async fn test_builds_tags_and_pushes_next_image() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));
        let cpln_dir = t.app_dir.path().join(".controlplane");
        std::fs::create_dir_all(&cpln_dir).unwrap();
        std::fs::write(cpln_dir.join("Dockerfile"), "FROM scratch\n").unwrap();
        t.runner
            .respond(["cpln", "image", "query"], CommandOutput::exited(0, IMAGES));

        BuildImageCommand {
            commit: Some("abc123".to_string()),
        }
        .run(&t.ctx)
        .await
        .unwrap();

        let lines = t.runner.command_lines();
        let dockerfile = cpln_dir.join("Dockerfile");
        assert_eq!(lines[0], "docker version");
        assert!(lines[1].starts_with("cpln image query --org my-org-staging"));
        assert_eq!(lines[2], "cpln image docker-login --org my-org-staging");
        assert_eq!(
            lines[3],
            format!(
                "docker build -t my-org-staging.registry.cpln.io/my-app-staging:3 -f {} --build-arg GIT_COMMIT=abc123 {}",
                dockerfile.display(),
                t.app_dir.path().display()
            )
        );
        assert_eq!(lines[4], "docker push my-org-staging.registry.cpln.io/my-app-staging:3");
        assert!(t.progress.contents()
            .ends_with("\nPushed image to '/org/my-org-staging/image/my-app-staging:3'.\n"));
    }

    #[tokio::test]
    async fn test_requires_docker() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));
        t.runner
            .respond(["docker", "version"], CommandOutput::exited(1, ""));

        let err = BuildImageCommand { commit: None }
            .run(&t.ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Can't run Docker."));
        assert_eq!(t.runner.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_requires_dockerfile() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));

        let err = BuildImageCommand { commit: None }
            .run(&t.ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Can't find Dockerfile at"));
    }
}
