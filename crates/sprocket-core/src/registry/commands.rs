//! Command entries, handlers and the registry itself.

use crate::transport::{Attachment, MessageRef};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Text an invoked command wants shown in place of the command message.
pub type CommandReply = Option<String>;

/// Invocation context passed to a command handler.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Normalised command token.
    pub token: String,
    /// Everything after the token, trimmed.
    pub args: String,
    /// Full message text.
    pub text: String,
    /// The message that issued the command (edited with the reply).
    pub message: MessageRef,
    /// Attachment of the message this command replies to, if any.
    pub reply_to: Option<Attachment>,
}

/// Handler for a registered command.
///
/// Handlers wrap arbitrary extension code, so failures are reported as
/// `anyhow` errors and rendered by the dispatcher.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command.
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<CommandReply>;
}

/// A registered command.
#[derive(Clone)]
pub struct CommandEntry {
    /// Unique command token (lowercase).
    pub token: String,
    /// Handler invoked on dispatch.
    pub handler: Arc<dyn CommandHandler>,
    /// Human-readable description.
    pub description: String,
    /// Name of the extension that registered the command.
    pub owner: String,
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("token", &self.token)
            .field("description", &self.description)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Result of registering a single token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The token was free or already belonged to the same owner.
    Registered,
    /// The token belonged to another extension and now belongs to this one.
    OverwroteExistingOwner {
        /// Extension that lost the token.
        previous_owner: String,
    },
}

/// Registrations collected from one extension before they are applied.
#[derive(Debug, Clone)]
pub struct RegistrationBatch {
    owner: String,
    entries: Vec<CommandEntry>,
}

impl RegistrationBatch {
    /// Creates an empty batch for `owner`.
    pub fn new(owner: impl Into<String>) -> Self {
        Self { owner: owner.into(), entries: Vec::new() }
    }

    /// Owner of every command in the batch.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Adds a command. A later push of the same token replaces the earlier one.
    pub fn push(
        &mut self,
        token: &str,
        handler: Arc<dyn CommandHandler>,
        description: impl Into<String>,
    ) {
        let token = normalize_token(token);
        self.entries.retain(|e| e.token != token);
        self.entries.push(CommandEntry {
            token,
            handler,
            description: description.into(),
            owner: self.owner.clone(),
        });
    }

    /// Tokens in registration order.
    pub fn tokens(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.token.clone()).collect()
    }

    /// Number of commands in the batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What [`CommandRegistry::apply`] changed, kept so the change can be reverted.
#[derive(Debug, Clone, Default)]
pub struct AppliedBatch {
    /// Tokens written by the batch, in registration order.
    pub inserted: Vec<String>,
    /// Entries of other owners that the batch overwrote.
    pub displaced: Vec<CommandEntry>,
    /// Per-token registration outcome.
    pub outcomes: Vec<(String, RegisterOutcome)>,
}

impl AppliedBatch {
    /// Outcomes where another extension lost a token.
    pub fn collisions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(token, outcome)| match outcome {
            RegisterOutcome::OverwroteExistingOwner { previous_owner } => {
                Some((token.as_str(), previous_owner.as_str()))
            }
            RegisterOutcome::Registered => None,
        })
    }
}

#[derive(Default)]
struct RegistryState {
    commands: HashMap<String, CommandEntry>,
    /// Tokens per owner in registration order.
    owned: HashMap<String, Vec<String>>,
    descriptions: HashMap<String, String>,
}

impl RegistryState {
    fn insert(&mut self, entry: CommandEntry) -> (RegisterOutcome, Option<CommandEntry>) {
        let previous = self.commands.remove(&entry.token);
        if let Some(prev) = &previous {
            self.detach(&prev.owner, &prev.token);
        }

        let outcome = match &previous {
            Some(prev) if prev.owner != entry.owner => {
                RegisterOutcome::OverwroteExistingOwner { previous_owner: prev.owner.clone() }
            }
            _ => RegisterOutcome::Registered,
        };

        self.owned.entry(entry.owner.clone()).or_default().push(entry.token.clone());
        self.commands.insert(entry.token.clone(), entry);
        (outcome, previous)
    }

    fn remove(&mut self, token: &str) -> Option<CommandEntry> {
        let entry = self.commands.remove(token)?;
        self.detach(&entry.owner, token);
        Some(entry)
    }

    fn detach(&mut self, owner: &str, token: &str) {
        if let Some(tokens) = self.owned.get_mut(owner) {
            tokens.retain(|t| t != token);
            if tokens.is_empty() {
                self.owned.remove(owner);
            }
        }
    }
}

/// In-memory command registry.
///
/// The extension loader is the only writer; the dispatcher and listing
/// features read concurrently.
pub struct CommandRegistry {
    state: RwLock<RegistryState>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry").finish_non_exhaustive()
    }
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { state: RwLock::new(RegistryState::default()) }
    }

    /// Registers a single command, overwriting any entry with the same token.
    ///
    /// Last writer wins even across extensions; the returned outcome tells
    /// the caller when another extension lost the token.
    pub async fn register(
        &self,
        token: &str,
        handler: Arc<dyn CommandHandler>,
        description: impl Into<String>,
        owner: &str,
    ) -> RegisterOutcome {
        let entry = CommandEntry {
            token: normalize_token(token),
            handler,
            description: description.into(),
            owner: owner.to_string(),
        };
        let mut state = self.state.write().await;
        let (outcome, _) = state.insert(entry);
        outcome
    }

    /// Installs a whole batch under one write lock.
    pub async fn apply(&self, batch: RegistrationBatch) -> AppliedBatch {
        let mut applied = AppliedBatch::default();
        let mut state = self.state.write().await;

        for entry in batch.entries {
            let token = entry.token.clone();
            let (outcome, previous) = state.insert(entry);
            if let Some(prev) = previous {
                if prev.owner != batch.owner {
                    applied.displaced.push(prev);
                }
            }
            applied.inserted.push(token.clone());
            applied.outcomes.push((token, outcome));
        }

        applied
    }

    /// Undoes an [`apply`](Self::apply): drops the inserted tokens and puts
    /// displaced entries back.
    pub async fn revert(&self, applied: &AppliedBatch) {
        let mut state = self.state.write().await;
        for token in &applied.inserted {
            state.remove(token);
        }
        for entry in &applied.displaced {
            state.insert(entry.clone());
        }
    }

    /// Removes every command owned by `owner` and returns the removed tokens.
    pub async fn unregister_all(&self, owner: &str) -> BTreeSet<String> {
        let mut state = self.state.write().await;
        let tokens = state.owned.remove(owner).unwrap_or_default();
        for token in &tokens {
            state.commands.remove(token);
        }
        tokens.into_iter().collect()
    }

    /// Removes the given tokens regardless of owner.
    pub async fn unregister_tokens<'a, I>(&self, tokens: I) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut state = self.state.write().await;
        tokens.into_iter().filter(|t| state.remove(t).is_some()).count()
    }

    /// Current full token set.
    pub async fn snapshot(&self) -> BTreeSet<String> {
        self.state.read().await.commands.keys().cloned().collect()
    }

    /// Looks up a command by token (case-insensitive).
    pub async fn lookup(&self, token: &str) -> Option<CommandEntry> {
        self.state.read().await.commands.get(&normalize_token(token)).cloned()
    }

    /// Commands owned by `owner`, in registration order.
    pub async fn commands_of(&self, owner: &str) -> Vec<CommandEntry> {
        let state = self.state.read().await;
        state
            .owned
            .get(owner)
            .map(|tokens| tokens.iter().filter_map(|t| state.commands.get(t).cloned()).collect())
            .unwrap_or_default()
    }

    /// Names of every extension that owns at least one command.
    pub async fn owners(&self) -> BTreeSet<String> {
        self.state.read().await.owned.keys().cloned().collect()
    }

    /// Sets the free-text description of an extension.
    pub async fn set_description(&self, owner: &str, description: impl Into<String>) {
        self.state.write().await.descriptions.insert(owner.to_string(), description.into());
    }

    /// Description of an extension, if one was set.
    pub async fn description(&self, owner: &str) -> Option<String> {
        self.state.read().await.descriptions.get(owner).cloned()
    }

    /// Drops the description of an extension.
    pub async fn remove_description(&self, owner: &str) -> Option<String> {
        self.state.write().await.descriptions.remove(owner)
    }

    /// Number of registered commands.
    pub async fn len(&self) -> usize {
        self.state.read().await.commands.len()
    }

    /// Whether no command is registered.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.commands.is_empty()
    }
}

fn normalize_token(token: &str) -> String {
    token.trim().to_lowercase()
}
