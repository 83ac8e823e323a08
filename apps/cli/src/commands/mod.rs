//! Command implementations for the Sprocket CLI.

pub mod list;
pub mod load;
pub mod run;
pub mod scan;
pub mod shell;
pub mod unload;

use crate::console::ConsoleTransport;
use colored::Colorize;
use sprocket_core::{Agent, Config};
use std::sync::Arc;

/// Starts an agent that talks to the terminal.
pub async fn start_agent(config: Config) -> anyhow::Result<(Agent, Arc<ConsoleTransport>)> {
    let console = Arc::new(ConsoleTransport::new());
    let agent = Agent::start(config, console.clone()).await?;

    let boot = agent.boot_summary();
    for (name, reason) in &boot.failed {
        eprintln!("{} {name}: {reason}", "Skipped".yellow());
    }
    Ok((agent, console))
}
