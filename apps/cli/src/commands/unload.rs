//! Unload command implementation.

use super::start_agent;
use anyhow::bail;
use sprocket_core::Config;
use sprocket_core::extensions::builtin::{render_error, render_removed};

/// Execute the unload command.
pub async fn execute(config: Config, name: &str) -> anyhow::Result<()> {
    let prefix = config.bot.command_prefix.clone();
    let (agent, _console) = start_agent(config).await?;

    match agent.loader().remove(name).await {
        Ok(outcome) => {
            println!("{}", render_removed(&outcome, &prefix));
            Ok(())
        }
        Err(e) => bail!(render_error("Failed to unload extension", &e)),
    }
}
