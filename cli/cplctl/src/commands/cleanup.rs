//! Cleanup commands: stale run workloads, old images, stale apps.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;

use crate::config::ResolvedApp;
use crate::images;
use crate::platform::Platform;

use super::{days_ago, CommandContext};

/// GVCs served by the app's config entry.
async fn matching_gvcs(app: &ResolvedApp, cp: &Platform<'_>) -> Result<Vec<String>> {
    if !app.options.match_if_app_name_starts_with {
        return Ok(vec![app.name.clone()]);
    }

    Ok(cp
        .fetch_gvcs()
        .await?
        .into_iter()
        .map(|gvc| gvc.name)
        .filter(|name| app.serves(name))
        .collect())
}

/// `NAME-run-NNNN`, as created for one-off runs.
fn is_run_workload(name: &str) -> bool {
    match name.rsplit_once("-run-") {
        Some((base, suffix)) => {
            !base.is_empty() && suffix.len() == 4 && suffix.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// `  NAME (CREATED - N days ago)` with the age in red.
fn stale_line(name: &str, created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = format!(
        "{} - {} days ago",
        created.format("%Y-%m-%dT%H:%M:%S%:z"),
        days_ago(created, now)
    );
    format!("  {name} ({})", age.as_str().red())
}

fn is_stale(created: DateTime<Utc>, now: DateTime<Utc>, days: u32) -> bool {
    days_ago(created, now) >= i64::from(days)
}

#[derive(Debug, Args)]
pub struct RunCleanupCommand {
    /// Skip delete confirmation.
    #[arg(long, short = 'y')]
    yes: bool,
}

struct StaleWorkload {
    gvc: String,
    name: String,
    created: DateTime<Utc>,
}

impl RunCleanupCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let days = app.stale_run_workload_created_days()?;

        let mut stale = Vec::new();
        for gvc in matching_gvcs(&app, &cp).await? {
            for workload in cp.query_workloads(&gvc, "-run-", true).await? {
                let Some(created) = workload.created else {
                    continue;
                };
                if is_run_workload(&workload.name) && is_stale(created, ctx.now, days) {
                    stale.push(StaleWorkload {
                        gvc: gvc.clone(),
                        name: workload.name,
                        created,
                    });
                }
            }
        }

        if stale.is_empty() {
            ctx.shell.progress("No stale run workloads found.");
            return Ok(());
        }

        ctx.shell.progress("Stale run workloads:");
        for workload in &stale {
            let label = if workload.gvc == app.name {
                workload.name.clone()
            } else {
                format!("{}/{}", workload.gvc, workload.name)
            };
            ctx.shell
                .progress(stale_line(&label, workload.created, ctx.now));
        }
        ctx.shell.blank();

        let prompt = format!(
            "Are you sure you want to delete these {} run workloads?",
            stale.len()
        );
        if !ctx.confirm(self.yes, &prompt)? {
            return Ok(());
        }

        for workload in &stale {
            ctx.step(
                &format!("Deleting run workload '{}'", workload.name),
                cp.delete_workload(&workload.gvc, &workload.name),
            )
            .await?;
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct CleanupOldImagesCommand {
    /// Skip delete confirmation.
    #[arg(long, short = 'y')]
    yes: bool,
}

impl CleanupOldImagesCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let days = app.image_retention_days()?;

        let mut old = Vec::new();
        for gvc in matching_gvcs(&app, &cp).await? {
            let records = cp.images(&gvc).await?;
            let latest = images::latest_image(&gvc, &records).map(|image| image.name.clone());

            for image in records {
                if !images::belongs_to(&image.name, &gvc) || Some(&image.name) == latest.as_ref() {
                    continue;
                }
                if let Some(created) = image.created.filter(|&at| is_stale(at, ctx.now, days)) {
                    old.push((image.name, created));
                }
            }
        }

        if old.is_empty() {
            ctx.shell.progress("No old images found.");
            return Ok(());
        }

        ctx.shell.progress("Old images:");
        for (name, created) in &old {
            ctx.shell.progress(stale_line(name, *created, ctx.now));
        }
        ctx.shell.blank();

        let prompt = format!("Are you sure you want to delete these {} images?", old.len());
        if !ctx.confirm(self.yes, &prompt)? {
            return Ok(());
        }

        for (name, _) in &old {
            ctx.step(&format!("Deleting image '{name}'"), cp.image_delete(name))
                .await?;
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct CleanupStaleAppsCommand {
    /// Skip delete confirmation.
    #[arg(long, short = 'y')]
    yes: bool,
}

struct StaleApp {
    gvc: String,
    deployed: DateTime<Utc>,
    images: Vec<String>,
}

impl CleanupStaleAppsCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let days = app.stale_app_image_deployed_days()?;

        let mut stale = Vec::new();
        for gvc in matching_gvcs(&app, &cp).await? {
            let records: Vec<_> = cp
                .images(&gvc)
                .await?
                .into_iter()
                .filter(|image| images::belongs_to(&image.name, &gvc))
                .collect();

            // Apps without a dated image can't be judged.
            let Some(deployed) = images::latest_image(&gvc, &records).and_then(|image| image.created)
            else {
                tracing::warn!(gvc = %gvc, "no dated image, skipping");
                continue;
            };
            if is_stale(deployed, ctx.now, days) {
                stale.push(StaleApp {
                    gvc,
                    deployed,
                    images: records.into_iter().map(|image| image.name).collect(),
                });
            }
        }

        if stale.is_empty() {
            ctx.shell.progress("No stale apps found.");
            return Ok(());
        }

        ctx.shell.progress("Stale apps:");
        for stale_app in &stale {
            ctx.shell
                .progress(stale_line(&stale_app.gvc, stale_app.deployed, ctx.now));
        }
        ctx.shell.blank();

        let prompt = format!("Are you sure you want to delete these {} apps?", stale.len());
        if !ctx.confirm(self.yes, &prompt)? {
            return Ok(());
        }

        let existing = cp.fetch_gvcs().await?;
        for stale_app in &stale {
            if existing.iter().any(|gvc| gvc.name == stale_app.gvc) {
                ctx.step(
                    &format!("Deleting app '{}'", stale_app.gvc),
                    cp.gvc_delete(&stale_app.gvc),
                )
                .await?;
            }
            for image in &stale_app.images {
                ctx.step(&format!("Deleting image '{image}'"), cp.image_delete(image))
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::CommandOutput;
    use crate::testing::{context, ScriptedPrompter, TestContext, CONFIG};
    use rstest::rstest;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const QUERY_PATH: &str = "/org/my-org-staging/gvc/my-app-staging/workload/-query";

    const LISTING: &str = "Stale run workloads:\n  \
        rails-run-4137 (2023-05-10T12:00:00+00:00 - 4 days ago)\n  \
        rails-run-7025 (2023-05-13T00:00:00+00:00 - 2 days ago)\n\n";

    #[rstest]
    #[case("rails-run-4137", true)]
    #[case("my-app-rails-run-0001", true)]
    #[case("rails", false)]
    #[case("rails-run-", false)]
    #[case("rails-run-12345", false)]
    #[case("-run-1234", false)]
    #[case("rails-run-12a4", false)]
    fn test_is_run_workload(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_run_workload(name), expected);
    }

    async fn mount_run_workloads(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "queryresult",
                "items": [
                    { "name": "rails-run-4137", "created": "2023-05-10T12:00:00Z" },
                    { "name": "rails-run-7025", "created": "2023-05-13T00:00:00Z" },
                    { "name": "rails-run-9999", "created": "2023-05-14T12:00:00Z" },
                    { "name": "rails-runner", "created": "2023-01-01T00:00:00Z" },
                ],
            })))
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(202))
            .mount(server)
            .await;
    }

    async fn deleted_paths(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|request| request.method.to_string() == "DELETE")
            .map(|request| request.url.path().to_string())
            .collect()
    }

    async fn run_cleanup(prompter: ScriptedPrompter, yes: bool) -> (TestContext, MockServer) {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, prompter);
        mount_run_workloads(&server).await;
        RunCleanupCommand { yes }.run(&t.ctx).await.unwrap();
        (t, server)
    }

    #[tokio::test]
    async fn test_run_cleanup_declined() {
        let (t, server) = run_cleanup(ScriptedPrompter::always(false), false).await;

        assert_eq!(
            t.prompter.prompts(),
            vec!["Are you sure you want to delete these 2 run workloads?".to_string()]
        );
        assert_eq!(t.progress.contents(), LISTING);
        assert!(deleted_paths(&server).await.is_empty());
    }

    #[tokio::test]
    async fn test_run_cleanup_deletes_in_listed_order() {
        let (t, server) = run_cleanup(ScriptedPrompter::always(true), false).await;

        assert_eq!(t.prompter.prompts().len(), 1);
        assert_eq!(
            deleted_paths(&server).await,
            vec![
                "/org/my-org-staging/gvc/my-app-staging/workload/rails-run-4137",
                "/org/my-org-staging/gvc/my-app-staging/workload/rails-run-7025",
            ]
        );
        assert_eq!(
            t.progress.contents(),
            format!(
                "{LISTING}Deleting run workload 'rails-run-4137'... done!\n\
                 Deleting run workload 'rails-run-7025'... done!\n"
            )
        );
    }

    #[tokio::test]
    async fn test_run_cleanup_skips_confirmation() {
        let (t, server) = run_cleanup(ScriptedPrompter::always(false), true).await;

        assert!(t.prompter.prompts().is_empty());
        assert_eq!(deleted_paths(&server).await.len(), 2);
    }

    #[tokio::test]
    async fn test_run_cleanup_nothing_stale() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
            .mount(&server)
            .await;

        RunCleanupCommand { yes: false }.run(&t.ctx).await.unwrap();

        assert_eq!(t.progress.contents(), "No stale run workloads found.\n");
        assert!(t.prompter.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_run_cleanup_requires_threshold() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-production"), &server, ScriptedPrompter::always(true));

        let err = RunCleanupCommand { yes: true }.run(&t.ctx).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't find option 'stale_run_workload_created_days' for app 'my-app-production' in 'controlplane.yml'."
        );
    }

    #[tokio::test]
    async fn test_old_images_keep_the_latest() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));
        t.runner.respond(
            ["cpln", "image", "query"],
            CommandOutput::exited(
                0,
                "items:\n\
                 - name: my-app-staging:1\n  created: 2023-05-01T00:00:00Z\n\
                 - name: my-app-staging:2\n  created: 2023-05-12T00:00:00Z\n\
                 - name: my-app-staging:3\n  created: 2023-05-02T00:00:00Z\n",
            ),
        );
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        CleanupOldImagesCommand { yes: false }.run(&t.ctx).await.unwrap();

        assert_eq!(
            t.prompter.prompts(),
            vec!["Are you sure you want to delete these 1 images?".to_string()]
        );
        assert_eq!(
            deleted_paths(&server).await,
            vec!["/org/my-org-staging/image/my-app-staging:1"]
        );
    }

    #[tokio::test]
    async fn test_stale_apps_across_prefixed_gvcs() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-review"), &server, ScriptedPrompter::always(true));
        Mock::given(method("GET"))
            .and(path("/org/my-org-staging/gvc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "name": "my-app-review-1" },
                    { "name": "my-app-review-2" },
                    { "name": "my-app-staging" },
                ],
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        t.runner.respond(
            ["cpln", "image", "query", "--org", "my-org-staging", "-o", "yaml", "--max", "-1", "--prop", "repository=my-app-review-1"],
            CommandOutput::exited(0, "items:\n  - name: my-app-review-1:1\n    created: 2023-05-01T00:00:00Z\n"),
        );
        t.runner.respond(
            ["cpln", "image", "query", "--org", "my-org-staging", "-o", "yaml", "--max", "-1", "--prop", "repository=my-app-review-2"],
            CommandOutput::exited(0, "items:\n  - name: my-app-review-2:1\n    created: 2023-05-14T00:00:00Z\n"),
        );

        CleanupStaleAppsCommand { yes: true }.run(&t.ctx).await.unwrap();

        assert_eq!(
            deleted_paths(&server).await,
            vec![
                "/org/my-org-staging/gvc/my-app-review-1",
                "/org/my-org-staging/image/my-app-review-1:1",
            ]
        );
        assert!(t.progress.contents()
            .starts_with("Stale apps:\n  my-app-review-1 (2023-05-01T00:00:00+00:00 - 14 days ago)\n"));
    }
}
