//! Sprocket Core - chat-controlled automation with hot-loadable extensions.
//!
//! This crate provides the core functionality for Sprocket, including:
//! - The extension lifecycle (submit, replace, remove) with rollback
//! - Dependency scanning and installation for submitted sources
//! - The command registry and chat dispatch
//! - Extension metadata persistence
//!
//! # Example
//!
//! ```rust,no_run
//! use sprocket_core::{Agent, Config, MessageRef};
//! # use std::sync::Arc;
//! # async fn demo(transport: Arc<dyn sprocket_core::Transport>) -> sprocket_core::Result<()> {
//! let config = Config::load(None)?;
//! let agent = Agent::start(config, transport).await?;
//! agent.handle_message(MessageRef::new(1, 1), ".help", None).await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod deps;
pub mod dispatch;
pub mod error;
pub mod extensions;
pub mod progress;
pub mod registry;
pub mod storage;
pub mod transport;

pub use agent::Agent;
pub use config::{Config, ConfigError};
pub use deps::{DependencyReport, DependencyResolver, PackageInstaller, PipInstaller};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{Result, SprocketError};
pub use extensions::{
    ExtensionError, ExtensionLoader, ExtensionRecord, ExtensionUnit, HostContext, RemovalOutcome,
    UnitLoader,
};
pub use progress::{ProgressGuard, ProgressReporter};
pub use registry::{CommandContext, CommandHandler, CommandRegistry, CommandReply};
pub use storage::{
    ExtensionMetadataStore, InMemoryMetadataStore, SettingsStore, SqliteMetadataStore,
    StorageError,
};
pub use transport::{Attachment, MessageRef, Transport, TransportError};
