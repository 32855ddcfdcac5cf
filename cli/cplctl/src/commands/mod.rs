//! CLI commands.

mod apply_template;
mod build_image;
mod cleanup;
mod config;
mod delete;
mod deploy_image;
mod env;
mod exists;
mod latest_image;
mod logs;
mod maintenance;
mod open;
mod promote;
mod ps;

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::client::{ApiClient, ApiHosts};
use crate::config::{Config, ConfigError, ResolvedApp};
use crate::cpln::CplnCli;
use crate::error::CliError;
use crate::external::{CommandRunner, SystemRunner};
use crate::platform::Platform;
use crate::retry::RetryPolicy;
use crate::shell::{self, Shell};

/// How long a domain route change takes to propagate.
const DOMAIN_SETTLE_DELAY: Duration = Duration::from_secs(30);

/// cpl - Build, deploy and operate apps on Control Plane.
#[derive(Debug, Parser)]
#[command(name = "cpl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// App name (also the GVC name on Control Plane).
    #[arg(long, short = 'a', global = true, env = "CPLN_APP")]
    app: Option<String>,

    /// Organization, overriding `cpln_org` from controlplane.yml.
    #[arg(long, global = true, env = "CPLN_ORG")]
    org: Option<String>,

    /// Show the output of `docker`/`cpln` and debug logs.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply application-specific configs from templates.
    ///
    /// Renders `.controlplane/templates/NAME.yml`, replacing `APP_GVC`,
    /// `APP_LOCATION`, `APP_ORG` and `APP_IMAGE`, and applies it with
    /// `cpln apply`. Asks before re-creating an existing app or workload.
    #[command(name = "apply-template")]
    ApplyTemplate(apply_template::ApplyTemplateCommand),

    /// Build and push the image to Control Plane.
    ///
    /// Automatically assigns image numbers (`app:1`, `app:2`, ...). Uses
    /// `.controlplane/Dockerfile` or the `dockerfile` option. A `--commit` is
    /// passed to the build as `GIT_COMMIT`.
    #[command(name = "build-image")]
    BuildImage(build_image::BuildImageCommand),

    /// Delete images older than `image_retention_days`.
    ///
    /// The latest image of the app is always kept. Asks for confirmation
    /// unless `--yes` is given.
    #[command(name = "cleanup-old-images")]
    CleanupOldImages(cleanup::CleanupOldImagesCommand),

    /// Delete apps whose latest image is older than `stale_app_image_deployed_days`.
    ///
    /// Considers every GVC served by the app's config entry. Asks for
    /// confirmation unless `--yes` is given.
    #[command(name = "cleanup-stale-apps")]
    CleanupStaleApps(cleanup::CleanupStaleAppsCommand),

    /// Show the resolved config of an app, or all configured apps.
    Config(config::ConfigCommand),

    /// Copy the latest image of the upstream app into this app's org.
    #[command(name = "copy-image-from-upstream")]
    CopyImageFromUpstream(promote::CopyImageFromUpstreamCommand),

    /// Delete the whole app (GVC with all workloads and all images).
    ///
    /// Asks for confirmation unless `--yes` is given.
    Delete(delete::DeleteCommand),

    /// Deploy the latest image to app workloads.
    #[command(name = "deploy-image")]
    DeployImage(deploy_image::DeployImageCommand),

    /// Show the app's GVC env vars.
    Env(env::EnvCommand),

    /// Exit with 0 if the app exists, 1 otherwise.
    Exists(exists::ExistsCommand),

    /// Show the latest image name of the app.
    #[command(name = "latest-image")]
    LatestImage(latest_image::LatestImageCommand),

    /// Show workload logs.
    ///
    /// Tails recent logs through `cpln logs`, or queries a time window with
    /// `--from`/`--to`.
    Logs(logs::LogsCommand),

    /// Show whether maintenance mode is on or off.
    Maintenance(maintenance::MaintenanceCommand),

    /// Disable maintenance mode.
    ///
    /// Starts the app workloads, routes the domain back to `one_off_workload`
    /// and stops the maintenance workload.
    #[command(name = "maintenance:off", alias = "maintenance-off")]
    MaintenanceOff(maintenance::MaintenanceOffCommand),

    /// Enable maintenance mode.
    ///
    /// Starts the maintenance workload, routes the domain to it and stops the
    /// app workloads. Only domains with path based routing and a `/` route on
    /// port 80 or 443 are supported.
    #[command(name = "maintenance:on", alias = "maintenance-on")]
    MaintenanceOn(maintenance::MaintenanceOnCommand),

    /// Open the endpoint of a workload in the browser.
    Open(open::OpenCommand),

    /// Open a shell on a replica of a workload.
    #[command(name = "open-console")]
    OpenConsole(open::OpenConsoleCommand),

    /// Copy the upstream image and deploy it.
    #[command(name = "promote-app-from-upstream")]
    PromoteAppFromUpstream(promote::PromoteAppFromUpstreamCommand),

    /// Show replicas of the app workloads.
    Ps(ps::PsCommand),

    /// Force a redeployment of workloads.
    #[command(name = "ps:restart")]
    PsRestart(ps::PsRestartCommand),

    /// Start (unsuspend) workloads.
    #[command(name = "ps:start")]
    PsStart(ps::PsStartCommand),

    /// Stop (suspend) workloads.
    #[command(name = "ps:stop")]
    PsStop(ps::PsStopCommand),

    /// Wait until workloads are ready.
    #[command(name = "ps:wait")]
    PsWait(ps::PsWaitCommand),

    /// Delete stale run workloads.
    ///
    /// Run workloads (`NAME-run-NNNN`) created more than
    /// `stale_run_workload_created_days` ago are listed and, after
    /// confirmation, deleted.
    #[command(name = "run:cleanup", alias = "run-cleanup")]
    RunCleanup(cleanup::RunCleanupCommand),

    /// Create the app from the `setup_app_templates` templates.
    #[command(name = "setup-app")]
    SetupApp(apply_template::SetupAppCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<ExitCode> {
        // Version works outside of an app directory.
        if matches!(self.command, Commands::Version) {
            print_version();
            return Ok(ExitCode::SUCCESS);
        }

        let cwd = std::env::current_dir().context("Failed to determine the working directory")?;
        let config = Config::discover(&cwd)?;

        let ctx = CommandContext::new(
            Shell::stdio(),
            config,
            Arc::new(SystemRunner),
            ApiHosts::from_env(),
            std::env::var("CPLN_TOKEN").ok(),
            self.app,
            self.org,
            self.verbose,
        )?;
        ctx.warn_deprecated_options();

        self.command.run(&ctx).await
    }

    /// Whether debug logging was requested.
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

fn print_version() {
    println!("cpl {}", env!("CARGO_PKG_VERSION"));
}

impl Commands {
    async fn run(self, ctx: &CommandContext) -> Result<ExitCode> {
        match self {
            Commands::ApplyTemplate(cmd) => cmd.run(ctx).await?,
            Commands::BuildImage(cmd) => cmd.run(ctx).await?,
            Commands::CleanupOldImages(cmd) => cmd.run(ctx).await?,
            Commands::CleanupStaleApps(cmd) => cmd.run(ctx).await?,
            Commands::Config(cmd) => cmd.run(ctx).await?,
            Commands::CopyImageFromUpstream(cmd) => cmd.run(ctx).await?,
            Commands::Delete(cmd) => cmd.run(ctx).await?,
            Commands::DeployImage(cmd) => cmd.run(ctx).await?,
            Commands::Env(cmd) => cmd.run(ctx).await?,
            Commands::Exists(cmd) => {
                return Ok(if cmd.run(ctx).await? {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                });
            }
            Commands::LatestImage(cmd) => cmd.run(ctx).await?,
            Commands::Logs(cmd) => cmd.run(ctx).await?,
            Commands::Maintenance(cmd) => cmd.run(ctx).await?,
            Commands::MaintenanceOff(cmd) => cmd.run(ctx).await?,
            Commands::MaintenanceOn(cmd) => cmd.run(ctx).await?,
            Commands::Open(cmd) => cmd.run(ctx).await?,
            Commands::OpenConsole(cmd) => cmd.run(ctx).await?,
            Commands::PromoteAppFromUpstream(cmd) => cmd.run(ctx).await?,
            Commands::Ps(cmd) => cmd.run(ctx).await?,
            Commands::PsRestart(cmd) => cmd.run(ctx).await?,
            Commands::PsStart(cmd) => cmd.run(ctx).await?,
            Commands::PsStop(cmd) => cmd.run(ctx).await?,
            Commands::PsWait(cmd) => cmd.run(ctx).await?,
            Commands::RunCleanup(cmd) => cmd.run(ctx).await?,
            Commands::SetupApp(cmd) => cmd.run(ctx).await?,
            Commands::Version => print_version(),
        }

        Ok(ExitCode::SUCCESS)
    }
}

/// Shared command context.
pub struct CommandContext {
    pub shell: Shell,
    pub config: Config,
    pub cli: CplnCli,
    pub api: ApiClient,
    /// Polling used while waiting for workloads.
    pub wait: RetryPolicy,
    /// Pause after switching a domain route.
    pub domain_settle: Duration,
    /// Time of this invocation.
    pub now: DateTime<Utc>,
    app: Option<String>,
    org: Option<String>,
}

impl CommandContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shell: Shell,
        config: Config,
        runner: Arc<dyn CommandRunner>,
        hosts: ApiHosts,
        env_token: Option<String>,
        app: Option<String>,
        org: Option<String>,
        verbose: bool,
    ) -> Result<Self> {
        let cli = CplnCli::new(runner, verbose);
        let api = ApiClient::new(hosts, env_token, cli.clone())?;

        Ok(Self {
            shell,
            config,
            cli,
            api,
            wait: RetryPolicy::readiness(),
            domain_settle: DOMAIN_SETTLE_DELAY,
            now: Utc::now(),
            app: app.filter(|app| !app.is_empty()),
            org: org.filter(|org| !org.is_empty()),
        })
    }

    /// The app given with `--app`, if any.
    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// Resolve the config entry of the current app.
    pub fn current(&self) -> Result<ResolvedApp, ConfigError> {
        let app = self.app().ok_or(ConfigError::NoApp)?;
        self.config.resolve(app)
    }

    /// Org for an app, preferring `--org` over the config.
    pub fn org_for<'a>(&'a self, app: &'a ResolvedApp) -> Result<&'a str, ConfigError> {
        match self.org.as_deref() {
            Some(org) => Ok(org),
            None => app.cpln_org(),
        }
    }

    /// Location, preferring a command flag over `default_location`.
    pub fn location<'a>(
        &self,
        app: &'a ResolvedApp,
        flag: Option<&'a str>,
    ) -> Result<&'a str, ConfigError> {
        match flag {
            Some(location) => Ok(location),
            None => app.default_location(),
        }
    }

    /// The current app together with a platform handle scoped to it.
    pub fn platform(&self) -> Result<(ResolvedApp, Platform<'_>)> {
        let app = self.current()?;
        let org = self.org_for(&app)?.to_string();
        let platform = Platform::new(&self.api, &self.cli, org, app.name.clone());
        Ok((app, platform))
    }

    fn warn_deprecated_options(&self) {
        let Ok(app) = self.current() else {
            return;
        };
        if app.deprecated.is_empty() {
            return;
        }

        for key in &app.deprecated {
            self.shell.warn_deprecated(&key.message());
        }
        self.shell.blank();
    }

    /// Print `message... `, run `action`, then `done!` or `failed!`.
    pub async fn step<T, E, F>(&self, message: &str, action: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        self.shell.progress_inline(format!("{message}... "));
        match action.await {
            Ok(value) => {
                self.shell.progress(shell::done());
                Ok(value)
            }
            Err(err) => {
                self.shell.progress(shell::failed());
                Err(err.into())
            }
        }
    }

    /// Like [`Self::step`], polling `check` with the wait policy until it
    /// returns `true`.
    pub async fn step_until<F, Fut>(&self, message: &str, check: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<bool, CliError>>,
    {
        self.shell.progress_inline(format!("{message}... "));
        match self.wait.poll(check).await {
            Ok(true) => {
                self.shell.progress(shell::done());
                Ok(())
            }
            Ok(false) => {
                self.shell.progress(shell::failed());
                Err(CliError::Timeout(format!(
                    "{message} (gave up after {} attempts)",
                    self.wait.max_attempts
                ))
                .into())
            }
            Err(err) => {
                self.shell.progress(shell::failed());
                Err(err.into())
            }
        }
    }

    /// Ask for confirmation unless `yes` was given.
    pub fn confirm(&self, yes: bool, prompt: &str) -> Result<bool> {
        if yes {
            return Ok(true);
        }
        self.shell.confirm(prompt)
    }
}

/// `N days ago` between two instants, rounded down.
pub fn days_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_days()
}
