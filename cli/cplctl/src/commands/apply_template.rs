//! Apply-template and setup-app commands.
//!
//! Templates live in `.controlplane/templates/NAME.yml` and may contain
//! several YAML documents. Placeholders are replaced before applying:
//! `APP_GVC`, `APP_LOCATION`, `APP_ORG` and `APP_IMAGE`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;

use crate::config::ResolvedApp;
use crate::platform::Platform;

use super::CommandContext;

/// Values substituted into templates.
#[derive(Debug, Clone, PartialEq)]
struct TemplateVars {
    gvc: String,
    location: String,
    org: String,
    image: String,
}

impl TemplateVars {
    fn render(&self, template: &str) -> String {
        template
            .replace("APP_GVC", &self.gvc)
            .replace("APP_LOCATION", &self.location)
            .replace("APP_ORG", &self.org)
            .replace("APP_IMAGE", &self.image)
    }
}

/// `(kind, name)` of every document in a rendered template.
fn resources(rendered: &str) -> Result<Vec<(String, String)>> {
    let mut found = Vec::new();
    for document in serde_yaml::Deserializer::from_str(rendered) {
        let value = serde_yaml::Value::deserialize(document)?;
        let kind = value.get("kind").and_then(serde_yaml::Value::as_str);
        let name = value.get("name").and_then(serde_yaml::Value::as_str);
        if let (Some(kind), Some(name)) = (kind, name) {
            found.push((kind.to_string(), name.to_string()));
        }
    }
    Ok(found)
}

fn template_path(ctx: &CommandContext, name: &str) -> PathBuf {
    ctx.config
        .app_cpln_dir()
        .join("templates")
        .join(format!("{name}.yml"))
}

/// Ask before overwriting resources that already exist. Returns `false` if
/// the user declined.
async fn confirm_recreate(
    ctx: &CommandContext,
    cp: &Platform<'_>,
    rendered: &str,
    yes: bool,
) -> Result<bool> {
    for (kind, name) in resources(rendered)? {
        let (label, exists) = match kind.as_str() {
            "gvc" => ("App", cp.fetch_gvc().await?.is_some()),
            "workload" => ("Workload", cp.fetch_workload(&name).await?.is_some()),
            _ => continue,
        };
        if !exists {
            continue;
        }

        let prompt = format!("{label} '{name}' already exists, do you want to re-create it?");
        if !ctx.confirm(yes, &prompt)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Render and apply templates in order.
async fn apply_templates(
    ctx: &CommandContext,
    app: &ResolvedApp,
    cp: &Platform<'_>,
    names: &[String],
    location: Option<&str>,
    yes: bool,
) -> Result<()> {
    let mut templates = Vec::with_capacity(names.len());
    for name in names {
        let path = template_path(ctx, name);
        if !path.is_file() {
            bail!(
                "Can't find template '{name}' at '{}', please create it.",
                path.display()
            );
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template '{}'", path.display()))?;
        templates.push((name, contents));
    }

    let image = if templates.iter().any(|(_, t)| t.contains("APP_IMAGE")) {
        cp.latest_image().await?
    } else {
        String::new()
    };
    let vars = TemplateVars {
        gvc: app.name.clone(),
        location: ctx.location(app, location)?.to_string(),
        org: cp.org.clone(),
        image,
    };

    let mut applied = Vec::new();
    let mut skipped = Vec::new();
    for (name, template) in templates {
        let rendered = vars.render(&template);
        if !confirm_recreate(ctx, cp, &rendered, yes).await? {
            skipped.push(name.as_str());
            continue;
        }

        let mut file = tempfile::Builder::new()
            .prefix("cpl-")
            .suffix(".yml")
            .tempfile()?;
        file.write_all(rendered.as_bytes())?;
        file.flush()?;

        ctx.step(
            &format!("Applying template '{name}'"),
            ctx.cli.apply(file.path(), &cp.gvc, &cp.org),
        )
        .await?;
        applied.push(name.as_str());
    }

    if !skipped.is_empty() {
        ctx.shell.blank();
        ctx.shell
            .progress(format!("Skipped templates: {}", skipped.join(", ")));
    }
    tracing::debug!(applied = ?applied, skipped = ?skipped, "templates processed");
    Ok(())
}

#[derive(Debug, Args)]
pub struct ApplyTemplateCommand {
    /// Template names (files in `.controlplane/templates` without `.yml`).
    #[arg(required = true)]
    templates: Vec<String>,

    /// Location (defaults to `default_location`).
    #[arg(long, short = 'l')]
    location: Option<String>,

    /// Skip confirmation before re-creating existing resources.
    #[arg(long, short = 'y')]
    yes: bool,
}

impl ApplyTemplateCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        apply_templates(
            ctx,
            &app,
            &cp,
            &self.templates,
            self.location.as_deref(),
            self.yes,
        )
        .await
    }
}

#[derive(Debug, Args)]
pub struct SetupAppCommand {}

impl SetupAppCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let templates = app.setup_app_templates()?;

        if cp.fetch_gvc().await?.is_some() {
            bail!(
                "App '{}' already exists. If you want to update it, please use 'cpl apply-template'.",
                app.name
            );
        }

        apply_templates(ctx, &app, &cp, templates, None, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::CommandOutput;
    use crate::testing::{context, ScriptedPrompter, TestContext, CONFIG};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RAILS: &str = "\
kind: workload
name: rails
spec:
  containers:
    - name: rails
      image: /org/APP_ORG/image/APP_IMAGE
  defaultOptions:
    autoscaling:
      location: APP_LOCATION
";

    const GVC: &str = "\
kind: gvc
name: APP_GVC
spec:
  staticPlacement:
    locationLinks:
      - /org/APP_ORG/location/APP_LOCATION
---
kind: identity
name: APP_GVC-identity
";

    fn write_template(t: &TestContext, name: &str, contents: &str) {
        let dir = t.app_dir.path().join(".controlplane/templates");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{name}.yml")), contents).unwrap();
    }

    fn applied_files(t: &TestContext) -> usize {
        t.runner
            .commands()
            .iter()
            .filter(|command| command.args.first().map(String::as_str) == Some("apply"))
            .count()
    }

    #[test]
    fn test_render_replaces_placeholders() {
        let vars = TemplateVars {
            gvc: "my-app-staging".to_string(),
            location: "aws-us-east-2".to_string(),
            org: "my-org-staging".to_string(),
            image: "my-app-staging:3".to_string(),
        };
        let rendered = vars.render(RAILS);
        assert!(rendered.contains("image: /org/my-org-staging/image/my-app-staging:3\n"));
        assert!(rendered.contains("location: aws-us-east-2\n"));
    }

    #[test]
    fn test_resources_of_multi_document_template() {
        assert_eq!(
            resources(GVC).unwrap(),
            vec![
                ("gvc".to_string(), "APP_GVC".to_string()),
                ("identity".to_string(), "APP_GVC-identity".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_confirms_before_recreating_workload() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(false));
        write_template(&t, "rails", RAILS);
        t.runner.respond(
            ["cpln", "image", "query"],
            CommandOutput::exited(0, "items:\n  - name: my-app-staging:3\n"),
        );
        Mock::given(method("GET"))
            .and(path("/org/my-org-staging/gvc/my-app-staging/workload/rails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "rails" })))
            .mount(&server)
            .await;

        ApplyTemplateCommand {
            templates: vec!["rails".to_string()],
            location: None,
            yes: false,
        }
        .run(&t.ctx)
        .await
        .unwrap();

        assert_eq!(
            t.prompter.prompts(),
            vec!["Workload 'rails' already exists, do you want to re-create it?".to_string()]
        );
        assert_eq!(applied_files(&t), 0);
        assert_eq!(t.progress.contents(), "\nSkipped templates: rails\n");
    }

    #[tokio::test]
    async fn test_applies_new_resources_without_prompt() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(false));
        write_template(&t, "gvc", GVC);

        ApplyTemplateCommand {
            templates: vec!["gvc".to_string()],
            location: None,
            yes: false,
        }
        .run(&t.ctx)
        .await
        .unwrap();

        assert!(t.prompter.prompts().is_empty());
        let commands = t.runner.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].args[..6],
            ["apply", "--gvc", "my-app-staging", "--org", "my-org-staging", "--file"]
        );
        assert_eq!(
            t.progress.contents(),
            "Applying template 'gvc'... done!\n"
        );
    }

    #[tokio::test]
    async fn test_missing_template() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));

        let err = ApplyTemplateCommand {
            templates: vec!["redis".to_string()],
            location: None,
            yes: true,
        }
        .run(&t.ctx)
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("Can't find template 'redis' at"));
    }

    #[tokio::test]
    async fn test_setup_app_refuses_existing_app() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-production"), &server, ScriptedPrompter::always(true));
        Mock::given(method("GET"))
            .and(path("/org/my-org-production/gvc/my-app-production"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "my-app-production" })))
            .mount(&server)
            .await;

        let err = SetupAppCommand {}.run(&t.ctx).await.unwrap_err();
        assert!(err.to_string().starts_with("App 'my-app-production' already exists."));
    }

    #[tokio::test]
    async fn test_setup_app_applies_configured_templates() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-production"), &server, ScriptedPrompter::always(false));
        write_template(&t, "gvc", GVC);
        write_template(&t, "rails", RAILS);
        t.runner.respond(
            ["cpln", "image", "query"],
            CommandOutput::exited(0, "items: []\n"),
        );

        SetupAppCommand {}.run(&t.ctx).await.unwrap();

        assert!(t.prompter.prompts().is_empty());
        assert_eq!(applied_files(&t), 2);
    }
}
