//! Run command implementation.
//!
//! Sends a single chat message to the agent and prints the reply.

use super::start_agent;
use crate::console::ConsoleTransport;
use colored::Colorize;
use sprocket_core::{Agent, Attachment, Config, DispatchOutcome, MessageRef};
use std::path::Path;

/// Execute the run command.
pub async fn execute(config: Config, text: &str, attach: Option<&Path>) -> anyhow::Result<()> {
    let (agent, console) = start_agent(config).await?;
    let outcome = send(&agent, &console, MessageRef::new(0, 1), text, attach).await;
    if let DispatchOutcome::Failed { .. } = outcome {
        anyhow::bail!("command failed");
    }
    Ok(())
}

/// Dispatches `text` and prints whatever the message ended up saying.
pub async fn send(
    agent: &Agent,
    console: &ConsoleTransport,
    message: MessageRef,
    text: &str,
    attach: Option<&Path>,
) -> DispatchOutcome {
    let reply_to = attach.map(attachment_for);

    console.begin();
    let outcome = agent.handle_message(message, text, reply_to).await;
    let shown = console.finish();

    match &outcome {
        DispatchOutcome::NotCommand => {
            println!("{}", format!("Not a command (prefix is {})", agent.config().bot.command_prefix).dimmed());
        }
        DispatchOutcome::UnknownCommand(token) => {
            println!("{} {token}", "Unknown command:".yellow());
        }
        DispatchOutcome::Handled { .. } => {
            if let Some(text) = shown {
                println!("{text}");
            }
        }
        DispatchOutcome::Failed { .. } => {
            if let Some(text) = shown {
                println!("{}", text.red());
            }
        }
    }
    outcome
}

fn attachment_for(path: &Path) -> Attachment {
    let mut attachment = Attachment::new(path.display().to_string());
    if let Some(name) = path.file_name() {
        attachment = attachment.with_file_name(name.to_string_lossy());
    }
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("py")) {
        attachment = attachment.with_mime_type("text/x-python");
    }
    attachment
}
