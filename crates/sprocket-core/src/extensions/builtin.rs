//! Built-in extensions implemented by the host.

use crate::extensions::loader::{ExtensionLoader, RemovalOutcome};
use crate::extensions::record::ExtensionRecord;
use crate::extensions::unit::{ExtensionUnit, HostContext, UnitResult};
use crate::extensions::ExtensionError;
use crate::progress::ProgressReporter;
use crate::registry::{CommandContext, CommandHandler, CommandReply};
use crate::transport::Transport;
use anyhow::anyhow;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

/// Canonical name of the loader built-in.
pub const LOADER_NAME: &str = "Loader";

/// Canonical name of the help built-in.
pub const HELP_NAME: &str = "Help";

/// Package diagnostics shown to the user on a dependency failure.
const ERROR_LINES: usize = 3;

fn upgrade(loader: &Weak<ExtensionLoader>) -> anyhow::Result<Arc<ExtensionLoader>> {
    loader.upgrade().ok_or_else(|| anyhow!("extension loader has shut down"))
}

/// Renders a successful load.
pub fn render_loaded(record: &ExtensionRecord, prefix: &str) -> String {
    let header = format!("Extension {} loaded (v{})", record.name, record.version);
    render_details(header, record, prefix)
}

/// Renders an active extension for `help <name>`.
pub fn render_info(record: &ExtensionRecord, prefix: &str) -> String {
    let header = format!("Extension {} (v{})", record.name, record.version);
    render_details(header, record, prefix)
}

fn render_details(mut text: String, record: &ExtensionRecord, prefix: &str) -> String {
    if !record.description.is_empty() {
        let _ = write!(text, "\n{}", record.description);
    }
    if record.commands.is_empty() {
        text.push_str("\nNo commands.");
    } else {
        text.push_str("\nCommands:");
        for command in &record.commands {
            let _ = write!(text, "\n  {prefix}{} - {}", command.token, command.description);
        }
    }
    let _ = write!(text, "\nDeveloper: {}", record.developer);
    text
}

/// Renders a removal.
pub fn render_removed(outcome: &RemovalOutcome, prefix: &str) -> String {
    let mut text = format!("Extension {} unloaded", outcome.name);
    if !outcome.commands.is_empty() {
        let tokens: Vec<String> = outcome.commands.iter().map(|t| format!("{prefix}{t}")).collect();
        let _ = write!(text, "\nRemoved commands: {}", tokens.join(", "));
    }
    if !outcome.file_deleted {
        text.push_str("\nNo source file was found on disk.");
    }
    text
}

/// Renders a lifecycle failure as a short status message.
pub fn render_error(action: &str, error: &ExtensionError) -> String {
    let mut lines = error.summary_lines(ERROR_LINES).into_iter();
    let mut text = format!("{action}: {}", lines.next().unwrap_or_default());
    for line in lines {
        let _ = write!(text, "\n• {line}");
    }
    text
}

// ============================================================================
// Loader
// ============================================================================

struct LoaderShared {
    loader: Weak<ExtensionLoader>,
    transport: Arc<dyn Transport>,
    progress: ProgressReporter,
    prefix: String,
}

/// Provides `lm` (load the replied-to source file) and `ulm <name>`.
pub struct LoaderExtension {
    shared: Arc<LoaderShared>,
}

impl LoaderExtension {
    /// Creates the built-in.
    pub fn new(
        loader: Weak<ExtensionLoader>,
        transport: Arc<dyn Transport>,
        progress: ProgressReporter,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(LoaderShared { loader, transport, progress, prefix: prefix.into() }),
        }
    }
}

#[async_trait]
impl ExtensionUnit for LoaderExtension {
    async fn setup(&self, host: &mut HostContext) -> UnitResult<()> {
        host.register_command(
            "lm",
            Arc::new(LoadCommand(Arc::clone(&self.shared))),
            "Load an extension from the replied-to file",
        );
        host.register_command(
            "ulm",
            Arc::new(UnloadCommand(Arc::clone(&self.shared))),
            "Unload an extension",
        );
        host.set_description("Dynamic extension loading");
        Ok(())
    }
}

struct LoadCommand(Arc<LoaderShared>);

#[async_trait]
impl CommandHandler for LoadCommand {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<CommandReply> {
        let shared = &self.0;
        let Some(attachment) = &ctx.reply_to else {
            return Ok(Some("Reply to a message with an extension file.".to_string()));
        };
        let loader = upgrade(&shared.loader)?;

        if !loader
            .unit_loader()
            .accepts(attachment.file_name.as_deref(), attachment.mime_type.as_deref())
        {
            return Ok(Some("That is not an extension source file.".to_string()));
        }
        let Some(file_name) = attachment.file_name.clone() else {
            return Ok(Some("Could not determine the file name.".to_string()));
        };

        let download = shared
            .progress
            .track(ctx.message, "Downloading", shared.transport.download_attachment(attachment))
            .await;
        let bytes = match download {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %file_name, error = %e, "Attachment download failed");
                return Ok(Some(format!("Failed to download {file_name}: {e}")));
            }
        };

        let result = shared
            .progress
            .track(ctx.message, "Loading extension", loader.submit(&bytes, &file_name, None))
            .await;
        Ok(Some(match result {
            Ok(record) => render_loaded(&record, &shared.prefix),
            Err(e) => {
                warn!(file = %file_name, error = %e, "Extension load failed");
                render_error("Failed to load extension", &e)
            }
        }))
    }
}

struct UnloadCommand(Arc<LoaderShared>);

#[async_trait]
impl CommandHandler for UnloadCommand {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<CommandReply> {
        let shared = &self.0;
        let query = ctx.args.trim();
        if query.is_empty() {
            return Ok(Some(format!("Usage: {}ulm <name>", shared.prefix)));
        }
        let loader = upgrade(&shared.loader)?;

        let result = shared
            .progress
            .track(ctx.message, format!("Removing {query}"), loader.remove(query))
            .await;
        Ok(Some(match result {
            Ok(outcome) => {
                info!(extension = %outcome.name, "Unloaded from chat");
                render_removed(&outcome, &shared.prefix)
            }
            Err(e) => render_error("Failed to unload extension", &e),
        }))
    }
}

// ============================================================================
// Help
// ============================================================================

/// Provides `help` and `help <name>`.
pub struct HelpExtension {
    loader: Weak<ExtensionLoader>,
    prefix: String,
}

impl HelpExtension {
    /// Creates the built-in.
    pub fn new(loader: Weak<ExtensionLoader>, prefix: impl Into<String>) -> Self {
        Self { loader, prefix: prefix.into() }
    }
}

#[async_trait]
impl ExtensionUnit for HelpExtension {
    async fn setup(&self, host: &mut HostContext) -> UnitResult<()> {
        let handler = HelpCommand { loader: self.loader.clone(), prefix: self.prefix.clone() };
        host.register_command("help", Arc::new(handler), "List extensions or show one");
        host.set_description("Extension and command reference");
        Ok(())
    }
}

struct HelpCommand {
    loader: Weak<ExtensionLoader>,
    prefix: String,
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<CommandReply> {
        let loader = upgrade(&self.loader)?;
        let query = ctx.args.trim();

        if query.is_empty() {
            let records = loader.list().await;
            let mut text = format!("{} extensions loaded:", records.len());
            for record in &records {
                let tokens: Vec<&str> = record.tokens().collect();
                let marker = if record.is_protected { " (built-in)" } else { "" };
                let _ = write!(text, "\n• {}{marker}: {}", record.name, tokens.join(", "));
            }
            let _ = write!(text, "\nUse {}help <name> for details.", self.prefix);
            return Ok(Some(text));
        }

        let record = match loader.resolve_name(query).await {
            Some(name) => loader.get(&name).await,
            None => None,
        };
        Ok(Some(match record {
            Some(record) => render_info(&record, &self.prefix),
            None => format!("Extension {query} not found."),
        }))
    }
}
