//! Agent assembly: wires configuration, storage, the extension loader,
//! the built-ins and the dispatcher together.

use crate::config::Config;
use crate::deps::{DependencyResolver, PipInstaller};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::Result;
use crate::extensions::builtin::{HELP_NAME, LOADER_NAME};
use crate::extensions::{
    BootSummary, ExtensionLoader, HelpExtension, LoaderExtension, PythonUnitLoader, UnitLoader,
};
use crate::progress::ProgressReporter;
use crate::registry::CommandRegistry;
use crate::storage::{ExtensionMetadataStore, SettingsStore, SqliteMetadataStore};
use crate::transport::{Attachment, MessageRef, Transport};
use std::sync::Arc;
use tracing::info;

/// A running agent.
pub struct Agent {
    config: Config,
    registry: Arc<CommandRegistry>,
    loader: Arc<ExtensionLoader>,
    dispatcher: Dispatcher,
    boot: BootSummary,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("boot", &self.boot)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Starts an agent with the default runtime: SQLite metadata, pip
    /// installs and Python units.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the built-ins
    /// cannot be installed.
    pub async fn start(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let store = Arc::new(SqliteMetadataStore::open(&config.paths.database)?);
        let installer = PipInstaller::new(config.dependencies.interpreter.clone())
            .with_pip_args(config.dependencies.pip_args.clone())
            .with_timeout(config.dependencies.install_timeout());
        let resolver = DependencyResolver::new(Arc::new(installer))
            .with_aliases(config.dependencies.alias_table())
            .with_provided(config.dependencies.provided.clone());
        let units = PythonUnitLoader::new(config.dependencies.interpreter.clone())
            .with_command_prefix(config.bot.command_prefix.clone());

        Self::start_with(config, transport, resolver, Arc::new(units), store.clone(), store).await
    }

    /// Starts an agent from explicit components.
    pub async fn start_with(
        config: Config,
        transport: Arc<dyn Transport>,
        resolver: DependencyResolver,
        units: Arc<dyn UnitLoader>,
        store: Arc<dyn ExtensionMetadataStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        let registry = Arc::new(CommandRegistry::new());
        let loader = Arc::new(ExtensionLoader::new(
            config.paths.clone(),
            config.extensions.clone(),
            Arc::clone(&registry),
            resolver,
            units,
            store,
            settings,
        ));

        let prefix = config.bot.command_prefix.clone();
        let progress = ProgressReporter::new(Arc::clone(&transport))
            .with_frames(config.progress.frames.clone())
            .with_interval(config.progress.interval());

        loader
            .install_builtin(HELP_NAME, Arc::new(HelpExtension::new(Arc::downgrade(&loader), &prefix)))
            .await?;
        loader
            .install_builtin(
                LOADER_NAME,
                Arc::new(LoaderExtension::new(
                    Arc::downgrade(&loader),
                    Arc::clone(&transport),
                    progress,
                    &prefix,
                )),
            )
            .await?;

        let boot = loader.load_installed().await?;
        let dispatcher = Dispatcher::new(prefix, Arc::clone(&registry), transport);
        info!(
            extensions = boot.loaded.len(),
            commands = registry.len().await,
            "Agent started"
        );

        Ok(Self { config, registry, loader, dispatcher, boot })
    }

    /// Handles one incoming chat message.
    pub async fn handle_message(
        &self,
        message: MessageRef,
        text: &str,
        reply_to: Option<Attachment>,
    ) -> DispatchOutcome {
        self.dispatcher.dispatch(message, text, reply_to).await
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared command registry.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// The extension loader.
    pub fn loader(&self) -> &Arc<ExtensionLoader> {
        &self.loader
    }

    /// What happened while loading installed extensions.
    pub fn boot_summary(&self) -> &BootSummary {
        &self.boot
    }
}
