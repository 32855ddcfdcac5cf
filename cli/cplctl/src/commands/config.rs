//! Config command.

use anyhow::Result;
use clap::Args;
use tabled::{Table, Tabled};

use crate::config::AppEntry;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct ConfigCommand {}

#[derive(Debug, Tabled)]
struct AppRow {
    #[tabled(rename = "App")]
    name: String,
    #[tabled(rename = "Org")]
    org: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Prefix match")]
    prefix_match: bool,
}

impl From<&AppEntry> for AppRow {
    fn from(entry: &AppEntry) -> Self {
        let options = &entry.options;
        Self {
            name: entry.name.clone(),
            org: options.cpln_org.clone().unwrap_or_default(),
            location: options.default_location.clone().unwrap_or_default(),
            prefix_match: options.match_if_app_name_starts_with,
        }
    }
}

impl ConfigCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        if ctx.app().is_none() {
            let rows: Vec<AppRow> = ctx.config.apps().iter().map(AppRow::from).collect();
            ctx.shell.puts(Table::new(rows));
            return Ok(());
        }

        let app = ctx.current()?;
        if app.entry == app.name {
            ctx.shell.progress(format!("Current config (app '{}'):", app.name));
        } else {
            ctx.shell.progress(format!(
                "Current config (app '{}', matched by '{}'):",
                app.name, app.entry
            ));
        }
        ctx.shell.blank();
        ctx.shell
            .puts(serde_yaml::to_string(&app.options)?.trim_end());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, ScriptedPrompter, CONFIG};
    use wiremock::MockServer;

    #[tokio::test]
    async fn test_prints_resolved_options() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-review-42"), &server, ScriptedPrompter::always(true));

        ConfigCommand {}.run(&t.ctx).await.unwrap();

        assert_eq!(
            t.progress.contents(),
            "Current config (app 'my-app-review-42', matched by 'my-app-review'):\n\n"
        );
        let out = t.out.contents();
        assert!(out.starts_with("cpln_org: my-org-staging\n"));
        assert!(out.contains("match_if_app_name_starts_with: true\n"));
        assert!(!out.contains("upstream"));
    }

    #[tokio::test]
    async fn test_lists_apps_without_app() {
        let server = MockServer::start().await;
        let t = context(CONFIG, None, &server, ScriptedPrompter::always(true));

        ConfigCommand {}.run(&t.ctx).await.unwrap();

        let out = t.out.contents();
        for name in ["my-app-staging", "my-app-review", "my-app-production"] {
            assert!(out.contains(name), "{name} missing from:\n{out}");
        }
        assert!(out.contains("my-org-production"));
        assert!(out.contains("Prefix match"));
    }
}
