//! Exists command.

use anyhow::Result;
use clap::Args;

use super::CommandContext;

/// Prints nothing; the answer is the exit code.
#[derive(Debug, Args)]
pub struct ExistsCommand {}

impl ExistsCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<bool> {
        let (_, cp) = ctx.platform()?;
        Ok(cp.fetch_gvc().await?.is_some())
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
    async fn test_exists() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));
        Mock::given(method("GET"))
            .and(path("/org/my-org-staging/gvc/my-app-staging"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "my-app-staging" })))
            .mount(&server)
            .await;

        assert!(ExistsCommand {}.run(&t.ctx).await.unwrap());
        assert!(t.out.contents().is_empty());
    }

    #[tokio::test]
    async fn test_does_not_exist() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));

        assert!(!ExistsCommand {}.run(&t.ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_api_errors_are_not_absence() {
        let server = MockServer::start().await;
        let t = context(CONFIG, Some("my-app-staging"), &server, ScriptedPrompter::always(true));
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = ExistsCommand {}.run(&t.ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "API request failed with status 500: boom");
    }
}
