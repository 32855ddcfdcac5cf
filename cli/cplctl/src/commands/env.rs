//! Env command.

use anyhow::Result;
use clap::Args;
use serde_json::Value;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct EnvCommand {}

impl EnvCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (_, cp) = ctx.platform()?;
        let gvc = cp.fetch_gvc_required().await?;

        let vars = gvc
            .pointer("/spec/env")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for var in vars {
            let Some(name) = var.get("name").and_then(Value::as_str) else {
                continue;
            };
            let value = var.get("value").and_then(Value::as_str).unwrap_or_default();
            ctx.shell.puts(format!("{name}={value}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, ScriptedPrompter, CONFIG};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_prints_gvc_env() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));
        Mock::given(method("GET"))
            .and(path("/org/my-org-staging/gvc/my-app-staging"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "my-app-staging",
                "spec": { "env": [
                    { "name": "RAILS_ENV", "value": "production" },
                    { "name": "EMPTY" },
                ]},
            })))
            .mount(&server)
            .await;

        EnvCommand {}.run(&t.ctx).await.unwrap();
        assert_eq!(t.out.contents(), "RAILS_ENV=production\nEMPTY=\n");
    }

    #[tokio::test]
    async fn test_missing_app() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));

        let err = EnvCommand {}.run(&t.ctx).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't find app 'my-app-staging', please create it with 'cpl setup-app -a my-app-staging'."
        );
    }
}
