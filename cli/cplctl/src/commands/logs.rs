//! Logs command.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde_json::Value;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct LogsCommand {
    /// Workload to show logs for (defaults to `one_off_workload`).
    #[arg(long, short = 'w')]
    workload: Option<String>,

    /// Maximum number of log lines.
    #[arg(long, default_value_t = 200)]
    limit: u32,

    /// Start of a time window (RFC 3339), instead of tailing.
    #[arg(long, requires = "to")]
    from: Option<DateTime<Utc>>,

    /// End of the time window (RFC 3339).
    #[arg(long, requires = "from")]
    to: Option<DateTime<Utc>>,
}

impl LogsCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let (app, cp) = ctx.platform()?;
        let workload = match self.workload {
            Some(workload) => workload,
            None => app.one_off_workload()?.to_string(),
        };

        let (Some(from), Some(to)) = (self.from, self.to) else {
            ctx.cli
                .logs(&workload, &cp.gvc, &cp.org, self.limit)
                .await?;
            return Ok(());
        };

        if from >= to {
            bail!("'--from' must be earlier than '--to'.");
        }

        let response = ctx
            .api
            .log_query(&cp.org, &cp.gvc, &workload, from, to, self.limit)
            .await?;
        for line in log_lines(&response) {
            ctx.shell.puts(line);
        }
        Ok(())
    }
}

/// Lines of a range query response across all streams, oldest first.
fn log_lines(response: &Value) -> Vec<&str> {
    let streams = response
        .pointer("/data/result")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut entries: Vec<(u128, &str)> = streams
        .iter()
        .filter_map(|stream| stream.get("values").and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| {
            let timestamp = entry.get(0)?.as_str()?.parse().ok()?;
            let line = entry.get(1)?.as_str()?;
            Some((timestamp, line))
        })
        .collect();
    entries.sort_by_key(|(timestamp, _)| *timestamp);

    entries.into_iter().map(|(_, line)| line).collect()
}
