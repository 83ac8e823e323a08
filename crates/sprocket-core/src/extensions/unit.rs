//! Loadable extension units and the host capability they receive.

use crate::extensions::record::ModuleInfo;
use crate::registry::{CommandHandler, RegistrationBatch};
use crate::storage::{SettingsStore, StorageError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading or setting up a unit.
#[derive(Debug, Error)]
pub enum UnitError {
    /// The source does not define the required entry point.
    #[error("missing entry point: {0}")]
    MissingEntryPoint(String),

    /// The source failed to import or its entry point raised.
    #[error("setup failed: {0}")]
    Setup(String),

    /// The unit runtime itself failed.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be read or written.
    #[error("settings error: {0}")]
    Settings(#[from] StorageError),
}

/// Result type for unit operations.
pub type UnitResult<T> = std::result::Result<T, UnitError>;

/// The capability handed to a unit's entry point.
///
/// Registrations are staged, not applied: the loader commits them to the
/// registry once setup has succeeded.
pub struct HostContext {
    name: String,
    batch: RegistrationBatch,
    description: Option<String>,
    settings: Arc<dyn SettingsStore>,
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("name", &self.name)
            .field("batch", &self.batch)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl HostContext {
    /// Creates a context for the extension `name`.
    pub fn new(name: impl Into<String>, settings: Arc<dyn SettingsStore>) -> Self {
        let name = name.into();
        Self { batch: RegistrationBatch::new(name.clone()), name, description: None, settings }
    }

    /// Canonical name of the extension being set up.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a command owned by this extension.
    pub fn register_command(
        &mut self,
        token: &str,
        handler: Arc<dyn CommandHandler>,
        description: impl Into<String>,
    ) {
        self.batch.push(token, handler, description);
    }

    /// Sets the extension's description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Loads this extension's persisted settings.
    pub async fn settings(&self) -> UnitResult<Value> {
        Ok(self.settings.load_settings(&self.name).await?)
    }

    /// Persists this extension's settings.
    pub async fn save_settings(&self, settings: &Value) -> UnitResult<()> {
        Ok(self.settings.save_settings(&self.name, settings).await?)
    }

    /// Settings store handle, for handlers that persist settings later.
    pub fn settings_store(&self) -> Arc<dyn SettingsStore> {
        Arc::clone(&self.settings)
    }

    pub(crate) fn into_parts(self) -> (RegistrationBatch, Option<String>) {
        (self.batch, self.description)
    }
}

/// A loaded extension.
#[async_trait]
pub trait ExtensionUnit: Send + Sync {
    /// The required entry point: registers commands through `host`.
    async fn setup(&self, host: &mut HostContext) -> UnitResult<()>;

    /// Optional self-reported metadata, available after setup.
    fn module_info(&self) -> Option<ModuleInfo> {
        None
    }
}

/// Turns source files of one dialect into extension units.
#[async_trait]
pub trait UnitLoader: Send + Sync {
    /// Loads the unit stored at `path` under the canonical `name`.
    async fn load(&self, name: &str, path: &Path) -> UnitResult<Arc<dyn ExtensionUnit>>;

    /// File extension of sources, without the dot.
    fn file_extension(&self) -> &str;

    /// Whether an attachment with this name and MIME type is a source file.
    fn accepts(&self, file_name: Option<&str>, mime_type: Option<&str>) -> bool;

    /// Name the source declares for itself, read without executing it.
    fn declared_name(&self, _source: &str) -> Option<String> {
        None
    }
}
