//! Platform access through the `cpln` and `docker` command line tools.
//!
//! Each call site keeps its own policy for a non-zero exit: write operations
//! fail the command, some reads report absence instead.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::CliError;
use crate::external::{CommandOutput, CommandRunner, ExternalCommand, Stream};

/// Registry host for an org's images.
pub fn registry_host(org: &str) -> String {
    format!("{org}.registry.cpln.io")
}

/// Platform link for an image in an org.
pub fn image_link(org: &str, image: &str) -> String {
    format!("/org/{org}/image/{image}")
}

/// An image as returned by `cpln image query`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageRecord {
    pub name: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Wrapper around the `cpln`/`docker` executables.
#[derive(Clone)]
pub struct CplnCli {
    runner: Arc<dyn CommandRunner>,
    verbose: bool,
    profile: Option<String>,
}

impl CplnCli {
    pub fn new(runner: Arc<dyn CommandRunner>, verbose: bool) -> Self {
        Self {
            runner,
            verbose,
            profile: None,
        }
    }

    /// A copy of this client that runs `cpln` under another profile.
    pub fn with_profile(&self, profile: impl Into<String>) -> Self {
        Self {
            profile: Some(profile.into()),
            ..self.clone()
        }
    }

    fn cpln(&self) -> ExternalCommand {
        let cmd = ExternalCommand::new("cpln");
        match &self.profile {
            Some(profile) => cmd.env("CPLN_PROFILE", profile),
            None => cmd,
        }
    }

    /// Stream policy for chatty write operations.
    fn noisy(&self) -> Stream {
        if self.verbose {
            Stream::Inherit
        } else {
            Stream::Discard
        }
    }

    /// Run and return the exit status without judging it.
    async fn perform(&self, command: ExternalCommand) -> Result<CommandOutput, CliError> {
        self.runner.run(&command).await
    }

    /// Run and fail on a non-zero exit.
    async fn perform_checked(&self, command: ExternalCommand) -> Result<CommandOutput, CliError> {
        let output = self.runner.run(&command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(CliError::CommandFailed {
                command: command.to_string(),
                code: output.code,
            })
        }
    }

    /// Run, fail on a non-zero exit, parse stdout as YAML.
    async fn perform_yaml<T: DeserializeOwned>(
        &self,
        command: ExternalCommand,
    ) -> Result<T, CliError> {
        let command = command.capture();
        let output = self.perform_checked(command.clone()).await?;
        parse_yaml(&command, &output.stdout)
    }

    /// Run and parse stdout as YAML; a non-zero exit means "no data".
    async fn perform_yaml_safely<T: DeserializeOwned>(
        &self,
        command: ExternalCommand,
    ) -> Result<Option<T>, CliError> {
        let command = command.capture().stderr(Stream::Discard);
        let output = self.runner.run(&command).await?;
        if !output.success() {
            return Ok(None);
        }
        parse_yaml(&command, &output.stdout).map(Some)
    }

    // profile

    /// Token of the current `cpln` profile.
    pub async fn profile_token(&self) -> Result<String, CliError> {
        let output = self
            .perform_checked(self.cpln().args(["profile", "token"]).capture())
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    pub async fn profile_exists(&self, profile: &str) -> Result<bool, CliError> {
        let found: Option<serde_yaml::Value> = self
            .perform_yaml_safely(self.cpln().args(["profile", "get", profile, "-o", "yaml"]))
            .await?;
        Ok(match found {
            Some(serde_yaml::Value::Sequence(items)) => !items.is_empty(),
            Some(serde_yaml::Value::Null) | None => false,
            Some(_) => true,
        })
    }

    pub async fn profile_create(&self, profile: &str, token: &str) -> Result<(), CliError> {
        let cmd = ExternalCommand::new("cpln")
            .args(["profile", "create", profile, "--token", token])
            .stdout(self.noisy());
        self.perform_checked(cmd).await.map(drop)
    }

    pub async fn profile_delete(&self, profile: &str) -> Result<(), CliError> {
        let cmd = ExternalCommand::new("cpln")
            .args(["profile", "delete", profile])
            .stdout(self.noisy());
        self.perform_checked(cmd).await.map(drop)
    }

    // image

    /// Whether the docker daemon answers.
    pub async fn docker_available(&self) -> Result<bool, CliError> {
        let cmd = ExternalCommand::new("docker")
            .arg("version")
            .stdout(Stream::Discard)
            .stderr(Stream::Discard);
        match self.perform(cmd).await {
            Ok(output) => Ok(output.success()),
            Err(CliError::Spawn { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn image_build(
        &self,
        image: &str,
        dockerfile: &Path,
        build_args: &[String],
        context_dir: &Path,
    ) -> Result<(), CliError> {
        let mut cmd = ExternalCommand::new("docker").args(["build", "-t", image, "-f"]);
        cmd = cmd.arg(dockerfile.display().to_string());
        for build_arg in build_args {
            cmd = cmd.args(["--build-arg", build_arg.as_str()]);
        }
        cmd = cmd.arg(context_dir.display().to_string());

        self.perform_checked(cmd).await.map(drop)
    }

    pub async fn image_push(&self, image: &str) -> Result<(), CliError> {
        let cmd = ExternalCommand::new("docker")
            .args(["push", image])
            .stdout(self.noisy());
        self.perform_checked(cmd).await.map(drop)
    }

    pub async fn image_pull(&self, image: &str) -> Result<(), CliError> {
        let cmd = ExternalCommand::new("docker")
            .args(["pull", image])
            .stdout(self.noisy());
        self.perform_checked(cmd).await.map(drop)
    }

    pub async fn image_tag(&self, old_tag: &str, new_tag: &str) -> Result<(), CliError> {
        let cmd = ExternalCommand::new("docker")
            .args(["tag", old_tag, new_tag])
            .stdout(self.noisy());
        self.perform_checked(cmd).await.map(drop)
    }

    /// Log docker into the org's registry.
    pub async fn image_login(&self, org: &str) -> Result<(), CliError> {
        let cmd = self
            .cpln()
            .args(["image", "docker-login", "--org", org])
            .stdout(self.noisy())
            .stderr(self.noisy());
        self.perform_checked(cmd).await.map(drop)
    }

    /// All images of `app` in `org`.
    pub async fn image_query(&self, app: &str, org: &str) -> Result<Vec<ImageRecord>, CliError> {
        let repository = format!("repository={app}");
        let cmd = self.cpln().args([
            "image",
            "query",
            "--org",
            org,
            "-o",
            "yaml",
            "--max",
            "-1",
            "--prop",
            repository.as_str(),
        ]);
        let list: ItemList<ImageRecord> = self.perform_yaml(cmd).await?;
        Ok(list.items)
    }

    // workload

    pub async fn workload_get_replicas(
        &self,
        workload: &str,
        gvc: &str,
        org: &str,
        location: &str,
    ) -> Result<Vec<String>, CliError> {
        let list: ItemList<String> = self
            .perform_yaml(self.replicas_command(workload, gvc, org, location))
            .await?;
        Ok(list.items)
    }

    /// Like [`Self::workload_get_replicas`], but `None` when `cpln` fails.
    pub async fn workload_get_replicas_safely(
        &self,
        workload: &str,
        gvc: &str,
        org: &str,
        location: &str,
    ) -> Result<Option<Vec<String>>, CliError> {
        let list: Option<ItemList<String>> = self
            .perform_yaml_safely(self.replicas_command(workload, gvc, org, location))
            .await?;
        Ok(list.map(|list| list.items))
    }

    fn replicas_command(&self, workload: &str, gvc: &str, org: &str, location: &str) -> ExternalCommand {
        self.cpln()
            .args(["workload", "get-replicas", workload])
            .args(scope(gvc, org))
            .args(["--location", location, "-o", "yaml"])
    }

    /// Point a container of a workload at an image of `org`.
    pub async fn workload_set_image_ref(
        &self,
        workload: &str,
        gvc: &str,
        org: &str,
        container: &str,
        image: &str,
    ) -> Result<(), CliError> {
        let setting = format!(
            "spec.containers.{container}.image={}",
            image_link(org, image)
        );
        let cmd = self
            .cpln()
            .args(["workload", "update", workload])
            .args(scope(gvc, org))
            .args(["--set", setting.as_str()])
            .stdout(self.noisy());
        self.perform_checked(cmd).await.map(drop)
    }

    pub async fn workload_force_redeployment(
        &self,
        workload: &str,
        gvc: &str,
        org: &str,
    ) -> Result<(), CliError> {
        let cmd = self
            .cpln()
            .args(["workload", "force-redeployment", workload])
            .args(scope(gvc, org))
            .stdout(self.noisy());
        self.perform_checked(cmd).await.map(drop)
    }

    /// Interactive shell into a replica.
    pub async fn workload_connect(
        &self,
        workload: &str,
        gvc: &str,
        org: &str,
        location: &str,
        container: Option<&str>,
        shell: Option<&str>,
    ) -> Result<(), CliError> {
        let mut cmd = self
            .cpln()
            .args(["workload", "connect", workload])
            .args(scope(gvc, org))
            .args(["--location", location]);
        if let Some(container) = container {
            cmd = cmd.args(["--container", container]);
        }
        if let Some(shell) = shell {
            cmd = cmd.args(["--shell", shell]);
        }
        self.perform_checked(cmd).await.map(drop)
    }

    // logs

    /// Tail the logs of a workload.
    pub async fn logs(&self, workload: &str, gvc: &str, org: &str, limit: u32) -> Result<(), CliError> {
        let query = format!("{{gvc=\"{gvc}\",workload=\"{workload}\"}}");
        let limit = limit.to_string();
        let cmd = self.cpln().args([
            "logs",
            query.as_str(),
            "--org",
            org,
            "-t",
            "-o",
            "raw",
            "--limit",
            limit.as_str(),
        ]);
        self.perform_checked(cmd).await.map(drop)
    }

    // browser

    /// Open a URL with the desktop's default handler.
    pub async fn open_url(&self, url: &str) -> Result<(), CliError> {
        let opener = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        let cmd = ExternalCommand::new(opener)
            .arg(url)
            .stdout(Stream::Discard)
            .stderr(Stream::Discard);
        self.perform_checked(cmd).await.map(drop)
    }

    // apply

    /// Apply a YAML file of resources to a GVC.
    pub async fn apply(&self, file: &Path, gvc: &str, org: &str) -> Result<(), CliError> {
        let cmd = self
            .cpln()
            .arg("apply")
            .args(scope(gvc, org))
            .args(["--file".to_string(), file.display().to_string()])
            .stdout(self.noisy());
        self.perform_checked(cmd).await.map(drop)
    }
}

fn scope(gvc: &str, org: &str) -> [String; 4] {
    [
        "--gvc".to_string(),
        gvc.to_string(),
        "--org".to_string(),
        org.to_string(),
    ]
}

fn parse_yaml<T: DeserializeOwned>(command: &ExternalCommand, stdout: &str) -> Result<T, CliError> {
    serde_yaml::from_str(stdout).map_err(|source| CliError::CommandOutput {
        command: command.to_string(),
        source,
    })
}
