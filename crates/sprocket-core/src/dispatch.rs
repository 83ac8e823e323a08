//! Chat message dispatch.
//!
//! Messages that start with the command prefix are parsed into a token and
//! arguments, looked up in the registry and handed to the owning extension.

use crate::registry::{CommandContext, CommandRegistry, CommandReply};
use crate::transport::{Attachment, MessageRef, Transport, TransportError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, error, warn};

static COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)(?:\s+([\s\S]*))?$").expect("valid command pattern"));

/// What happened to a dispatched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The message is not a command.
    NotCommand,
    /// The token is not registered.
    UnknownCommand(String),
    /// The handler ran.
    Handled {
        /// Command token.
        token: String,
        /// Text the message was edited to, if any.
        reply: CommandReply,
    },
    /// The handler returned an error.
    Failed {
        /// Command token.
        token: String,
        /// Short error shown to the user.
        error: String,
    },
}

/// Routes chat messages to registered commands.
pub struct Dispatcher {
    prefix: String,
    registry: Arc<CommandRegistry>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("prefix", &self.prefix).finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher for `prefix`.
    pub fn new(
        prefix: impl Into<String>,
        registry: Arc<CommandRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self { prefix: prefix.into(), registry, transport }
    }

    /// Splits `text` into a lowercase token and trimmed arguments.
    pub fn parse(&self, text: &str) -> Option<(String, String)> {
        let body = text.trim_start().strip_prefix(self.prefix.as_str())?;
        let caps = COMMAND_RE.captures(body.trim_end())?;
        let token = caps.get(1)?.as_str().to_lowercase();
        let args = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
        Some((token, args))
    }

    /// Dispatches one message.
    ///
    /// # Arguments
    /// * `message` - The message that carried `text`; edited with the reply
    /// * `text` - Message text
    /// * `reply_to` - Attachment of the replied-to message, if any
    pub async fn dispatch(
        &self,
        message: MessageRef,
        text: &str,
        reply_to: Option<Attachment>,
    ) -> DispatchOutcome {
        let Some((token, args)) = self.parse(text) else {
            return DispatchOutcome::NotCommand;
        };
        let Some(entry) = self.registry.lookup(&token).await else {
            debug!(token = %token, "Ignoring unknown command");
            return DispatchOutcome::UnknownCommand(token);
        };

        let ctx = CommandContext {
            token: token.clone(),
            args,
            text: text.to_string(),
            message,
            reply_to,
        };
        debug!(token = %token, owner = %entry.owner, "Dispatching command");

        match entry.handler.handle(&ctx).await {
            Ok(reply) => {
                if let Some(text) = &reply {
                    self.edit(&message, text).await;
                }
                DispatchOutcome::Handled { token, reply }
            }
            Err(e) => {
                error!(token = %token, owner = %entry.owner, error = ?e, "Command failed");
                let shown = format!("Error in {}{token}: {e}", self.prefix);
                self.edit(&message, &shown).await;
                DispatchOutcome::Failed { token, error: e.to_string() }
            }
        }
    }

    async fn edit(&self, message: &MessageRef, text: &str) {
        match self.transport.edit_status_message(message, text).await {
            Ok(()) | Err(TransportError::NotModified) => {}
            Err(e) => warn!(error = %e, "Failed to edit command message"),
        }
    }
}
