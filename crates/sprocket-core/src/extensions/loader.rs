//! The extension loader: submit, replace, remove and boot-time loading.

use crate::config::{ExtensionsConfig, PathsConfig};
use crate::deps::DependencyResolver;
use crate::extensions::locks::NameLocks;
use crate::extensions::record::ExtensionRecord;
use crate::extensions::resolve::resolve_name;
use crate::extensions::transaction::{LoadTransaction, RollbackAction};
use crate::extensions::unit::{ExtensionUnit, HostContext, UnitLoader};
use crate::extensions::{ExtensionError, Result};
use crate::registry::CommandRegistry;
use crate::storage::{ExtensionMetadataStore, SettingsStore};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// What [`ExtensionLoader::remove`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    /// Canonical name of the removed extension.
    pub name: String,
    /// Whether the backing file existed and was deleted.
    pub file_deleted: bool,
    /// Tokens that were unregistered.
    pub commands: Vec<String>,
}

/// Result of [`ExtensionLoader::load_installed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootSummary {
    /// Extensions that became active.
    pub loaded: Vec<String>,
    /// Extensions that failed to load, with the reason.
    pub failed: Vec<(String, String)>,
    /// Stale metadata records that were dropped.
    pub pruned: Vec<String>,
}

struct ActiveExtension {
    record: ExtensionRecord,
    unit: Arc<dyn ExtensionUnit>,
}

/// Owns the extension lifecycle.
///
/// The loader is the only writer of the extensions directory, the command
/// registry and the metadata store. Operations on the same name are
/// serialized; different names interleave freely.
pub struct ExtensionLoader {
    paths: PathsConfig,
    policy: ExtensionsConfig,
    registry: Arc<CommandRegistry>,
    resolver: DependencyResolver,
    units: Arc<dyn UnitLoader>,
    store: Arc<dyn ExtensionMetadataStore>,
    settings: Arc<dyn SettingsStore>,
    active: RwLock<HashMap<String, ActiveExtension>>,
    locks: NameLocks,
}

impl std::fmt::Debug for ExtensionLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("paths", &self.paths)
            .field("policy", &self.policy)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl ExtensionLoader {
    /// Creates a loader.
    ///
    /// # Arguments
    /// * `paths` - Extensions and staging directories
    /// * `policy` - Protected names and fuzzy-resolution threshold
    /// * `registry` - Shared command registry
    /// * `resolver` - Dependency resolver for submitted sources
    /// * `units` - Loader for the source dialect
    /// * `store` - Metadata store
    /// * `settings` - Per-extension settings store
    pub fn new(
        paths: PathsConfig,
        policy: ExtensionsConfig,
        registry: Arc<CommandRegistry>,
        resolver: DependencyResolver,
        units: Arc<dyn UnitLoader>,
        store: Arc<dyn ExtensionMetadataStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            paths,
            policy,
            registry,
            resolver,
            units,
            store,
            settings,
            active: RwLock::new(HashMap::new()),
            locks: NameLocks::new(),
        }
    }

    /// Shared command registry.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Loader for the source dialect.
    pub fn unit_loader(&self) -> &Arc<dyn UnitLoader> {
        &self.units
    }

    /// All active extensions, sorted by name.
    pub async fn list(&self) -> Vec<ExtensionRecord> {
        let mut records: Vec<_> =
            self.active.read().await.values().map(|a| a.record.clone()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Record of the active extension `name`.
    pub async fn get(&self, name: &str) -> Option<ExtensionRecord> {
        self.active.read().await.get(name).map(|a| a.record.clone())
    }

    /// Loaded unit of the active extension `name`.
    pub async fn unit(&self, name: &str) -> Option<Arc<dyn ExtensionUnit>> {
        self.active.read().await.get(name).map(|a| Arc::clone(&a.unit))
    }

    /// Resolves a user query to an active canonical name.
    ///
    /// A trailing source extension (`love.py`) is ignored.
    pub async fn resolve_name(&self, query: &str) -> Option<String> {
        let query = self.strip_source_extension(query.trim());
        let names: Vec<String> = self.active.read().await.keys().cloned().collect();
        resolve_name(query, &names, self.policy.fuzzy_threshold)
    }

    fn strip_source_extension<'a>(&self, query: &'a str) -> &'a str {
        let suffix = format!(".{}", self.units.file_extension());
        let cut = query.len().saturating_sub(suffix.len());
        match query.get(cut..) {
            Some(tail) if cut > 0 && tail.eq_ignore_ascii_case(&suffix) => &query[..cut],
            _ => query,
        }
    }

    fn live_path(&self, name: &str) -> PathBuf {
        self.paths.extensions_dir.join(format!("{name}.{}", self.units.file_extension()))
    }

    /// Derives the canonical name of a submission.
    ///
    /// An explicit request wins, then a name the source declares, then the
    /// file stem.
    pub fn canonical_name(
        &self,
        source: &str,
        file_name: &str,
        requested_name: Option<&str>,
    ) -> Option<String> {
        requested_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or_else(|| self.units.declared_name(source))
            .or_else(|| {
                Path::new(file_name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().trim().to_string())
                    .filter(|s| !s.is_empty())
            })
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ExtensionError::Validation("extension name is empty".to_string()));
        }
        if name.contains(['/', '\\']) || name.starts_with('.') || name.contains('\0') {
            return Err(ExtensionError::Validation(format!("invalid extension name: {name}")));
        }
        if self.policy.is_protected(name) {
            return Err(ExtensionError::Validation(format!(
                "{name} is a protected extension and cannot be replaced"
            )));
        }
        Ok(())
    }

    /// Rejects `name` when an active extension differs from it only in case.
    ///
    /// Live files are named after the canonical name, and `Love.py` and
    /// `love.py` are the same file on case-insensitive filesystems.
    async fn check_case_conflict(&self, name: &str) -> Result<()> {
        let active = self.active.read().await;
        match active.keys().find(|other| *other != name && other.eq_ignore_ascii_case(name)) {
            Some(other) => Err(ExtensionError::Validation(format!(
                "{name} conflicts with active extension {other}"
            ))),
            None => Ok(()),
        }
    }

    /// Submits a source file, replacing any active extension of the same name.
    ///
    /// # Arguments
    /// * `bytes` - Raw source file contents
    /// * `file_name` - Attachment file name, used for the default name
    /// * `requested_name` - Explicit canonical name, if any
    ///
    /// # Errors
    /// * `ExtensionError::Validation` - Protected or malformed name, non-UTF-8 source
    /// * `ExtensionError::Dependency` - A package failed to install
    /// * `ExtensionError::Load` - Staging, loading, setup or persistence failed
    pub async fn submit(
        &self,
        bytes: &[u8],
        file_name: &str,
        requested_name: Option<&str>,
    ) -> Result<ExtensionRecord> {
        let source = std::str::from_utf8(bytes).map_err(|_| {
            ExtensionError::Validation(format!("{file_name} is not valid UTF-8 source"))
        })?;
        let name = self.canonical_name(source, file_name, requested_name).ok_or_else(|| {
            ExtensionError::Validation(format!("cannot derive a name from {file_name}"))
        })?;
        self.validate_name(&name)?;

        let _guard = self.locks.acquire(&name).await;
        self.check_case_conflict(&name).await?;
        info!(extension = %name, file = %file_name, "Submitting extension");

        let mut tx = LoadTransaction::new();
        let staged = match self.stage(bytes).await {
            Ok(path) => path,
            Err(e) => {
                return Err(ExtensionError::Load(format!("failed to stage {file_name}: {e}")));
            }
        };
        tx.staged_file_path = Some(staged.clone());
        tx.push(RollbackAction::DeleteFile(staged.clone()));

        let identifiers = self.resolver.scan(source);
        debug!(extension = %name, dependencies = ?identifiers, "Scanned dependencies");
        let report = self.resolver.resolve(&identifiers).await;
        if !report.is_success() {
            warn!(
                extension = %name,
                failed = report.failed.len(),
                "Dependency installation failed"
            );
            self.rollback(tx).await;
            return Err(ExtensionError::Dependency { report });
        }
        if !report.installed.is_empty() {
            info!(extension = %name, packages = ?report.installed, "Installed dependencies");
        }

        if self.active.read().await.contains_key(&name) {
            info!(extension = %name, "Replacing active extension");
            self.remove_locked(&name).await;
        }

        tx.command_snapshot_before = self.registry.snapshot().await;

        let live = self.live_path(&name);
        if let Err(e) = promote(&staged, &live).await {
            self.rollback(tx).await;
            return Err(ExtensionError::Load(format!("failed to install {file_name}: {e}")));
        }
        tx.push(RollbackAction::DeleteFile(live.clone()));

        let unit = match self.units.load(&name, &live).await {
            Ok(unit) => unit,
            Err(e) => {
                error!(extension = %name, error = %e, "Failed to load extension");
                self.rollback(tx).await;
                return Err(ExtensionError::Load(e.to_string()));
            }
        };

        self.activate(tx, &name, unit, Some(live), false).await
    }

    /// Registers a protected extension implemented by the host.
    pub async fn install_builtin(
        &self,
        name: &str,
        unit: Arc<dyn ExtensionUnit>,
    ) -> Result<ExtensionRecord> {
        let _guard = self.locks.acquire(name).await;
        if self.active.read().await.contains_key(name) {
            return Err(ExtensionError::Validation(format!("{name} is already installed")));
        }
        let mut tx = LoadTransaction::new();
        tx.command_snapshot_before = self.registry.snapshot().await;
        self.activate(tx, name, unit, None, true).await
    }

    /// Sets up `unit`, commits its commands and persists its record.
    async fn activate(
        &self,
        mut tx: LoadTransaction,
        name: &str,
        unit: Arc<dyn ExtensionUnit>,
        backing_file_path: Option<PathBuf>,
        protected: bool,
    ) -> Result<ExtensionRecord> {
        let mut host = HostContext::new(name, Arc::clone(&self.settings));
        if let Err(e) = unit.setup(&mut host).await {
            error!(extension = %name, error = %e, "Extension setup failed");
            self.rollback(tx).await;
            return Err(ExtensionError::Load(e.to_string()));
        }

        let (batch, description) = host.into_parts();
        let previous_description = self.registry.description(name).await;
        let applied = self.registry.apply(batch).await;
        for (token, previous_owner) in applied.collisions() {
            warn!(
                extension = %name,
                token = %token,
                previous_owner = %previous_owner,
                "Command token taken over from another extension"
            );
        }
        if let Some(text) = &description {
            self.registry.set_description(name, text.clone()).await;
        }
        tx.push(RollbackAction::RevertRegistry {
            applied,
            owner: name.to_string(),
            previous_description,
        });

        let registered: Vec<(String, String)> = self
            .registry
            .commands_of(name)
            .await
            .into_iter()
            .map(|entry| (entry.token, entry.description))
            .collect();
        let added = self.registry.snapshot().await;
        let new_tokens = added.difference(&tx.command_snapshot_before).count();
        debug!(extension = %name, new_tokens, "Registry updated");

        let info = unit.module_info();
        let mut record =
            ExtensionRecord::build(name, &registered, info.as_ref(), description, backing_file_path);
        if protected {
            record = record.protected();
        }

        self.active.write().await.insert(
            name.to_string(),
            ActiveExtension { record: record.clone(), unit: Arc::clone(&unit) },
        );
        tx.push(RollbackAction::EvictUnit(name.to_string()));

        tx.push(RollbackAction::DeleteRecord(name.to_string()));
        if let Err(e) = self.store.upsert(&record).await {
            error!(extension = %name, error = %e, "Failed to persist extension metadata");
            self.rollback(tx).await;
            return Err(ExtensionError::Load(format!("failed to persist metadata: {e}")));
        }

        tx.commit();
        info!(
            extension = %name,
            commands = record.commands.len(),
            version = %record.version,
            "Extension active"
        );
        Ok(record)
    }

    /// Removes an active extension.
    ///
    /// # Errors
    /// * `ExtensionError::NotFound` - No active extension matches `identifier`
    /// * `ExtensionError::ProtectedModule` - The extension is protected
    pub async fn remove(&self, identifier: &str) -> Result<RemovalOutcome> {
        let query = self.strip_source_extension(identifier.trim());
        if let Some(protected) = self.policy.protected_name(query) {
            return Err(ExtensionError::ProtectedModule(protected.to_string()));
        }

        let name = self
            .resolve_name(identifier)
            .await
            .ok_or_else(|| ExtensionError::NotFound(identifier.trim().to_string()))?;

        let protected_record = self.active.read().await.get(&name).is_some_and(|a| a.record.is_protected);
        if protected_record || self.policy.is_protected(&name) {
            return Err(ExtensionError::ProtectedModule(name));
        }

        let _guard = self.locks.acquire(&name).await;
        if !self.active.read().await.contains_key(&name) {
            return Err(ExtensionError::NotFound(name));
        }

        Ok(self.remove_locked(&name).await)
    }

    /// Removal steps; the caller holds the name lock. Never rolled back.
    async fn remove_locked(&self, name: &str) -> RemovalOutcome {
        let removed = self.registry.unregister_all(name).await;
        self.registry.remove_description(name).await;
        let active = self.active.write().await.remove(name);

        let path = active
            .and_then(|a| a.record.backing_file_path)
            .unwrap_or_else(|| self.live_path(name));
        let file_deleted = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(extension = %name, path = %path.display(), error = %e, "Failed to delete extension file");
                false
            }
        };

        if let Err(e) = self.store.delete(name).await {
            warn!(extension = %name, error = %e, "Failed to delete extension metadata");
        }

        info!(extension = %name, commands = removed.len(), file_deleted, "Extension removed");
        RemovalOutcome { name: name.to_string(), file_deleted, commands: removed.into_iter().collect() }
    }

    /// Loads every source in the extensions directory and drops records
    /// whose extension is no longer active.
    ///
    /// Failures are logged and skipped; the files stay in place.
    pub async fn load_installed(&self) -> Result<BootSummary> {
        let mut summary = BootSummary::default();
        let dir = &self.paths.extensions_dir;
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            ExtensionError::Load(format!("cannot create {}: {e}", dir.display()))
        })?;

        let staging = &self.paths.staging_dir;
        tokio::fs::create_dir_all(staging).await.map_err(|e| {
            ExtensionError::Load(format!("cannot create {}: {e}", staging.display()))
        })?;

        let mut sources = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| ExtensionError::Load(format!("cannot read {}: {e}", dir.display())))?;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Stopped scanning extensions directory");
                    break;
                }
            };
            let path = entry.path();
            let matches_dialect = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(self.units.file_extension()));
            if path.is_file() && matches_dialect {
                sources.push(path);
            }
        }
        sources.sort();

        for path in sources {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            match self.load_file(&name, &path).await {
                Ok(_) => summary.loaded.push(name),
                Err(e) => {
                    warn!(extension = %name, error = %e, "Skipping extension at boot");
                    summary.failed.push((name, e.to_string()));
                }
            }
        }

        match self.store.list_all().await {
            Ok(records) => {
                let active = self.active.read().await;
                let stale: Vec<String> = records
                    .into_iter()
                    .filter(|r| !active.contains_key(&r.name))
                    .map(|r| r.name)
                    .collect();
                drop(active);
                for name in stale {
                    match self.store.delete(&name).await {
                        Ok(_) => summary.pruned.push(name),
                        Err(e) => warn!(extension = %name, error = %e, "Failed to prune record"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not list extension records"),
        }

        info!(
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            pruned = summary.pruned.len(),
            "Installed extensions loaded"
        );
        Ok(summary)
    }

    async fn load_file(&self, name: &str, path: &Path) -> Result<ExtensionRecord> {
        self.validate_name(name)?;
        let _guard = self.locks.acquire(name).await;
        if self.active.read().await.contains_key(name) {
            return Err(ExtensionError::Validation(format!("{name} is already active")));
        }
        self.check_case_conflict(name).await?;

        let mut tx = LoadTransaction::new();
        tx.command_snapshot_before = self.registry.snapshot().await;
        let unit = self
            .units
            .load(name, path)
            .await
            .map_err(|e| ExtensionError::Load(e.to_string()))?;
        self.activate(tx, name, unit, Some(path.to_path_buf()), false).await
    }

    async fn stage(&self, bytes: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.paths.staging_dir).await?;
        let path = self
            .paths
            .staging_dir
            .join(format!("{}.{}", uuid::Uuid::new_v4(), self.units.file_extension()));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Executes the undo log, most recent step first.
    async fn rollback(&self, tx: LoadTransaction) {
        debug!(staged = ?tx.staged_file_path, "Rolling back load");
        for action in tx.into_rollback() {
            match action {
                RollbackAction::DeleteFile(path) => match tokio::fs::remove_file(&path).await {
                    Ok(()) => debug!(path = %path.display(), "Rolled back file"),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to delete file during rollback");
                    }
                },
                RollbackAction::RevertRegistry { applied, owner, previous_description } => {
                    self.registry.revert(&applied).await;
                    match previous_description {
                        Some(text) => self.registry.set_description(&owner, text).await,
                        None => {
                            self.registry.remove_description(&owner).await;
                        }
                    }
                }
                RollbackAction::EvictUnit(name) => {
                    self.active.write().await.remove(&name);
                }
                RollbackAction::DeleteRecord(name) => {
                    if let Err(e) = self.store.delete(&name).await {
                        warn!(extension = %name, error = %e, "Failed to delete record during rollback");
                    }
                }
            }
        }
    }
}

/// Moves a staged file into place, replacing any existing file.
async fn promote(staged: &Path, live: &Path) -> std::io::Result<()> {
    if let Some(parent) = live.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(staged, live).await {
        Ok(()) => Ok(()),
        Err(_) => {
            // Staging and live directories may sit on different filesystems.
            tokio::fs::copy(staged, live).await?;
            tokio::fs::remove_file(staged).await
        }
    }
}
