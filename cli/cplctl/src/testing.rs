//! Test doubles: recording command runner, scripted prompter, captured shell.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::MockServer;

use crate::client::{ApiClient, ApiHosts};
use crate::commands::CommandContext;
use crate::config::Config;
use crate::cpln::CplnCli;
use crate::error::CliError;
use crate::external::{CommandOutput, CommandRunner, ExternalCommand};
use crate::retry::RetryPolicy;
use crate::shell::{Prompter, Shell};

/// Config shared by command tests.
pub const CONFIG: &str = r#"
aliases:
  common: &common
    cpln_org: my-org-staging
    default_location: aws-us-east-2
    one_off_workload: rails
    app_workloads:
      - rails
    additional_workloads:
      - redis
      - postgres
    maintenance_workload: maintenance

apps:
  my-app-staging:
    <<: *common
    stale_run_workload_created_days: 2
    image_retention_days: 5
    stale_app_image_deployed_days: 5

  my-app-review:
    <<: *common
    match_if_app_name_starts_with: true
    stale_app_image_deployed_days: 5

  my-app-production:
    <<: *common
    cpln_org: my-org-production
    upstream: my-app-staging
    setup_app_templates:
      - gvc
      - rails
"#;

/// Fixed "now" of command tests.
pub const NOW: &str = "2023-05-15T00:00:00Z";

/// In-memory writer readable after the fact.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Prompter answering from a script and recording the questions.
#[derive(Clone)]
pub struct ScriptedPrompter {
    answers: Arc<Mutex<VecDeque<bool>>>,
    fallback: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn always(answer: bool) -> Self {
        Self::answers([], answer)
    }

    /// Answer with `answers` in order, then with `fallback`.
    pub fn answers(answers: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into_iter().collect())),
            fallback,
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback))
    }
}

/// Shell writing into buffers: `(shell, stdout, stderr)`. Colors are off so
/// captured output can be compared as plain text.
pub fn captured_shell(prompter: ScriptedPrompter) -> (Shell, SharedBuffer, SharedBuffer) {
    colored::control::set_override(false);
    let out = SharedBuffer::default();
    let progress = SharedBuffer::default();
    let shell = Shell::new(
        Box::new(out.clone()),
        Box::new(progress.clone()),
        Box::new(prompter),
    );
    (shell, out, progress)
}

/// Runner that records commands and replies with canned output.
///
/// A reply is selected by the longest registered prefix of
/// `program args...`; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    replies: Mutex<Vec<(Vec<String>, CommandOutput)>>,
    commands: Mutex<Vec<ExternalCommand>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond<I, S>(&self, prefix: I, output: CommandOutput)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix = prefix.into_iter().map(Into::into).collect();
        self.replies.lock().unwrap().push((prefix, output));
    }

    pub fn commands(&self) -> Vec<ExternalCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Recorded commands rendered as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.commands().iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<CommandOutput, CliError> {
        self.commands.lock().unwrap().push(command.clone());

        let line: Vec<&str> = std::iter::once(command.program.as_str())
            .chain(command.args.iter().map(String::as_str))
            .collect();
        let replies = self.replies.lock().unwrap();
        let reply = replies
            .iter()
            .filter(|(prefix, _)| {
                prefix.len() <= line.len() && prefix.iter().zip(&line).all(|(a, b)| a == b)
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone());

        Ok(reply.unwrap_or_else(|| CommandOutput::exited(0, "")))
    }
}

/// API client against a mock server, authenticated with the token `token`.
pub fn api_client(server: &MockServer) -> ApiClient {
    let hosts = ApiHosts {
        api: server.uri(),
        logs: server.uri(),
    };
    ApiClient::new(
        hosts,
        Some("token".to_string()),
        CplnCli::new(FakeRunner::new(), false),
    )
    .unwrap()
}

/// A command context wired to fakes.
pub struct TestContext {
    pub ctx: CommandContext,
    pub out: SharedBuffer,
    pub progress: SharedBuffer,
    pub prompter: ScriptedPrompter,
    pub runner: Arc<FakeRunner>,
    pub app_dir: tempfile::TempDir,
}

/// Build a context for `app` from `config`, talking to `server`.
pub fn context(
    config: &str,
    app: Option<&str>,
    server: &MockServer,
    prompter: ScriptedPrompter,
) -> TestContext {
    let app_dir = tempfile::tempdir().unwrap();
    let config = Config::from_yaml(config, app_dir.path()).unwrap();
    let runner = FakeRunner::new();
    let (shell, out, progress) = captured_shell(prompter.clone());
    let hosts = ApiHosts {
        api: server.uri(),
        logs: server.uri(),
    };

    let mut ctx = CommandContext::new(
        shell,
        config,
        runner.clone(),
        hosts,
        Some("token".to_string()),
        app.map(str::to_string),
        None,
        false,
    )
    .unwrap();
    ctx.wait = RetryPolicy::new(3, Duration::ZERO);
    ctx.domain_settle = Duration::ZERO;
    ctx.now = NOW.parse().unwrap();

    TestContext {
        ctx,
        out,
        progress,
        prompter,
        runner,
        app_dir,
    }
}
