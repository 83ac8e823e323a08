//! Load command implementation.

use super::start_agent;
use anyhow::{Context, bail};
use sprocket_core::extensions::builtin::{render_error, render_loaded};
use sprocket_core::{Config, MessageRef, ProgressReporter};
use std::path::Path;

/// Execute the load command.
///
/// Submits a local source file as if it had been sent through chat.
pub async fn execute(config: Config, file: &Path, name: Option<String>) -> anyhow::Result<()> {
    let bytes =
        tokio::fs::read(file).await.with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("Source path has no file name")?;

    let prefix = config.bot.command_prefix.clone();
    let progress = config.progress.clone();
    let (agent, console) = start_agent(config).await?;
    let reporter = ProgressReporter::new(console.clone())
        .with_frames(progress.frames.clone())
        .with_interval(progress.interval());

    console.begin();
    let result = reporter
        .track(
            MessageRef::new(0, 0),
            "Loading extension",
            agent.loader().submit(&bytes, &file_name, name.as_deref()),
        )
        .await;
    console.finish();

    match result {
        Ok(record) => {
            println!("{}", render_loaded(&record, &prefix));
            Ok(())
        }
        Err(e) => bail!(render_error("Failed to load extension", &e)),
    }
}
