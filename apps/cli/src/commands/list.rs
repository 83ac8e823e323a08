//! List command implementation.

use colored::Colorize;
use sprocket_core::{Config, ExtensionMetadataStore, SqliteMetadataStore};

/// Execute the list command.
///
/// Reads persisted records without loading any extension.
pub async fn execute(config: &Config, json_output: bool) -> anyhow::Result<()> {
    let store = SqliteMetadataStore::open(&config.paths.database)?;
    let records = store.list_all().await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No extensions installed.".yellow());
        return Ok(());
    }
    for record in &records {
        let marker = if record.is_protected { " (built-in)".dimmed().to_string() } else { String::new() };
        println!("{} v{}{marker}", record.name.bold(), record.version);
        if !record.description.is_empty() {
            println!("  {}", record.description);
        }
        for command in &record.commands {
            println!(
                "  {}{} - {}",
                config.bot.command_prefix,
                command.token.cyan(),
                command.description
            );
        }
    }
    Ok(())
}
