//! Interactive shell: every line is a chat message.
//!
//! A line starting with `@path ` replies to a message carrying that file,
//! so `@love.py .lm` loads `love.py`.

use super::run::send;
use super::start_agent;
use colored::Colorize;
use sprocket_core::{Config, MessageRef};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Splits an optional `@path` attachment off `line`.
pub fn split_attachment(line: &str) -> (Option<&str>, &str) {
    match line.strip_prefix('@') {
        Some(rest) => match rest.split_once(char::is_whitespace) {
            Some((path, text)) => (Some(path), text.trim_start()),
            None => (Some(rest), ""),
        },
        None => (None, line),
    }
}

/// Execute the shell command.
pub async fn execute(config: Config) -> anyhow::Result<()> {
    let (agent, console) = start_agent(config).await?;
    let prefix = agent.config().bot.command_prefix.clone();
    println!(
        "{} {} extensions loaded. Try {}help, or exit to quit.",
        "Sprocket".bold().cyan(),
        agent.loader().list().await.len(),
        prefix
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut message_id = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        message_id += 1;
        let (attach, text) = split_attachment(line);
        send(&agent, &console, MessageRef::new(0, message_id), text, attach.map(Path::new)).await;
    }
    Ok(())
}
