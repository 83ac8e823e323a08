//! Shared test utilities for Sprocket Core integration tests.
//!
//! Extensions in these tests use a tiny line-based dialect instead of Python:
//!
//! ```text
//! name=Love              declared name (first line only)
//! import requests        scanned like any other source
//! command love1 Classic  registers `love1`
//! description Hearts     extension description
//! version 2.0.0          self-reported version
//! missing setup          the entry point is absent
//! fail setup             the entry point raises
//! ```

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use sprocket_core::config::{Config, PathsConfig};
use sprocket_core::deps::{default_aliases, DependencyResolver, InstallOutcome, PackageInstaller};
use sprocket_core::extensions::{ExtensionUnit, HostContext, ModuleInfo, UnitError, UnitResult};
use sprocket_core::registry::{CommandContext, CommandHandler, CommandReply};
use sprocket_core::storage::{StorageError, StorageResult};
use sprocket_core::transport::TransportResult;
use sprocket_core::{
    Agent, Attachment, ExtensionMetadataStore, ExtensionRecord, InMemoryMetadataStore, MessageRef,
    SettingsStore, Transport, TransportError, UnitLoader,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Unit loader
// ============================================================================

/// Loads units written in the test dialect.
pub struct LineUnitLoader;

#[async_trait]
impl UnitLoader for LineUnitLoader {
    async fn load(&self, name: &str, path: &Path) -> UnitResult<Arc<dyn ExtensionUnit>> {
        let source = tokio::fs::read_to_string(path).await?;
        if source.lines().any(|l| l.trim() == "missing setup") {
            return Err(UnitError::MissingEntryPoint(format!("{name} defines no setup")));
        }
        Ok(Arc::new(LineUnit::parse(name, &source)))
    }

    fn file_extension(&self) -> &str {
        "py"
    }

    fn accepts(&self, file_name: Option<&str>, _mime_type: Option<&str>) -> bool {
        file_name.is_some_and(|n| n.to_lowercase().ends_with(".py"))
    }

    fn declared_name(&self, source: &str) -> Option<String> {
        source.lines().next()?.strip_prefix("name=").map(|n| n.trim().to_string())
    }
}

struct LineUnit {
    name: String,
    commands: Vec<(String, String)>,
    description: Option<String>,
    version: Option<String>,
    fail_setup: bool,
}

impl LineUnit {
    fn parse(name: &str, source: &str) -> Self {
        let mut unit = Self {
            name: name.to_string(),
            commands: Vec::new(),
            description: None,
            version: None,
            fail_setup: false,
        };
        for line in source.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("command ") {
                let (token, description) = rest.split_once(' ').unwrap_or((rest, ""));
                unit.commands.push((token.to_string(), description.to_string()));
            } else if let Some(rest) = line.strip_prefix("description ") {
                unit.description = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("version ") {
                unit.version = Some(rest.to_string());
            } else if line == "fail setup" {
                unit.fail_setup = true;
            }
        }
        unit
    }
}

#[async_trait]
impl ExtensionUnit for LineUnit {
    async fn setup(&self, host: &mut HostContext) -> UnitResult<()> {
        if self.fail_setup {
            return Err(UnitError::Setup(format!("{} raised during setup", self.name)));
        }
        for (token, description) in &self.commands {
            let handler = Reply { owner: self.name.clone() };
            host.register_command(token, Arc::new(handler), description.clone());
        }
        if let Some(description) = &self.description {
            host.set_description(description.clone());
        }
        Ok(())
    }

    fn module_info(&self) -> Option<ModuleInfo> {
        self.version
            .as_ref()
            .map(|version| ModuleInfo { version: Some(version.clone()), ..ModuleInfo::default() })
    }
}

struct Reply {
    owner: String,
}

#[async_trait]
impl CommandHandler for Reply {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<CommandReply> {
        Ok(Some(format!("{} from {}", ctx.token, self.owner)))
    }
}

// ============================================================================
// Installer
// ============================================================================

/// Installer that never spawns processes.
#[derive(Default)]
pub struct CountingInstaller {
    /// Identifiers that are already importable.
    pub available: HashSet<String>,
    /// Packages whose installation fails.
    pub broken: HashSet<String>,
    lookups: AtomicUsize,
    installs: Mutex<Vec<String>>,
}

impl CountingInstaller {
    pub fn with_available(mut self, names: &[&str]) -> Self {
        self.available.extend(names.iter().map(|n| (*n).to_string()));
        self
    }

    pub fn with_broken(mut self, names: &[&str]) -> Self {
        self.broken.extend(names.iter().map(|n| (*n).to_string()));
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn installs(&self) -> Vec<String> {
        self.installs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageInstaller for CountingInstaller {
    async fn available(&self, identifiers: &[String]) -> HashSet<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        identifiers.iter().filter(|i| self.available.contains(*i)).cloned().collect()
    }

    async fn install(&self, package: &str) -> InstallOutcome {
        self.installs.lock().unwrap().push(package.to_string());
        if self.broken.contains(package) {
            InstallOutcome::failed(package, format!("ERROR: No matching distribution found for {package}"))
        } else {
            InstallOutcome { package: package.to_string(), success: true, exit_code: Some(0), output: String::new() }
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// In-memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryMetadataStore,
    fail_upserts: AtomicBool,
}

impl FlakyStore {
    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExtensionMetadataStore for FlakyStore {
    async fn get(&self, name: &str) -> StorageResult<Option<ExtensionRecord>> {
        self.inner.get(name).await
    }

    async fn upsert(&self, record: &ExtensionRecord) -> StorageResult<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(StorageError::InvalidData("disk full".to_string()));
        }
        self.inner.upsert(record).await
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        self.inner.delete(name).await
    }

    async fn list_all(&self) -> StorageResult<Vec<ExtensionRecord>> {
        self.inner.list_all().await
    }
}

#[async_trait]
impl SettingsStore for FlakyStore {
    async fn load_settings(&self, name: &str) -> StorageResult<Value> {
        self.inner.load_settings(name).await
    }

    async fn save_settings(&self, name: &str, settings: &Value) -> StorageResult<()> {
        self.inner.save_settings(name, settings).await
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Serves attachments from memory and records message edits.
#[derive(Default)]
pub struct MemoryTransport {
    files: Mutex<HashMap<String, Vec<u8>>>,
    edits: Mutex<Vec<String>>,
}

impl MemoryTransport {
    /// Makes `bytes` downloadable and returns an attachment for them.
    pub fn attach(&self, file_name: &str, bytes: &str) -> Attachment {
        let reference = format!("file-{}", self.files.lock().unwrap().len());
        self.files.lock().unwrap().insert(reference.clone(), bytes.as_bytes().to_vec());
        Attachment::new(reference).with_file_name(file_name).with_mime_type("text/x-python")
    }

    pub fn edits(&self) -> Vec<String> {
        self.edits.lock().unwrap().clone()
    }

    pub fn last_edit(&self) -> Option<String> {
        self.edits.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn download_attachment(&self, attachment: &Attachment) -> TransportResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&attachment.reference)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(attachment.reference.clone()))
    }

    async fn edit_status_message(&self, _message: &MessageRef, text: &str) -> TransportResult<()> {
        let mut edits = self.edits.lock().unwrap();
        if edits.last().is_some_and(|last| last == text) {
            return Err(TransportError::NotModified);
        }
        edits.push(text.to_string());
        Ok(())
    }

    async fn delete_message(&self, _message: &MessageRef) -> TransportResult<()> {
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A running agent over temporary directories and fakes.
pub struct TestHost {
    pub dir: TempDir,
    pub agent: Agent,
    pub installer: Arc<CountingInstaller>,
    pub store: Arc<FlakyStore>,
    pub transport: Arc<MemoryTransport>,
}

/// Test configuration rooted at `root`.
/// Routes tracing output through the test harness; `RUST_LOG` overrides the
/// default `warn` level. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths = PathsConfig {
        extensions_dir: root.join("extensions"),
        staging_dir: root.join("staging"),
        database: root.join("sprocket.db"),
    };
    config.progress.interval_ms = 10;
    config
}

impl TestHost {
    pub async fn start() -> Self {
        Self::start_in(tempfile::tempdir().unwrap(), CountingInstaller::default(), Arc::default()).await
    }

    pub async fn with_installer(installer: CountingInstaller) -> Self {
        Self::start_in(tempfile::tempdir().unwrap(), installer, Arc::default()).await
    }

    /// Starts an agent over an existing directory and store.
    pub async fn start_in(dir: TempDir, installer: CountingInstaller, store: Arc<FlakyStore>) -> Self {
        init_tracing();
        let installer = Arc::new(installer);
        let transport = Arc::new(MemoryTransport::default());
        let agent = Agent::start_with(
            test_config(dir.path()),
            transport.clone(),
            DependencyResolver::new(installer.clone()).with_aliases(default_aliases()),
            Arc::new(LineUnitLoader),
            store.clone(),
            store.clone(),
        )
        .await
        .expect("agent starts");
        Self { dir, agent, installer, store, transport }
    }

    pub fn extensions_dir(&self) -> PathBuf {
        self.dir.path().join("extensions")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    /// Sorted file names in `dir` (empty if it does not exist).
    pub fn listing(dir: &Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> =
            entries.filter_map(Result::ok).map(|e| e.file_name().to_string_lossy().to_string()).collect();
        names.sort();
        names
    }

    pub async fn tokens(&self) -> BTreeSet<String> {
        self.agent.registry().snapshot().await
    }

    /// Checks that the registry, the active set and the store agree.
    pub async fn assert_consistent(&self) {
        let loader = self.agent.loader();
        let registry = self.agent.registry();
        let records = loader.list().await;

        let mut owned = BTreeSet::new();
        for record in &records {
            let registered: Vec<String> =
                registry.commands_of(&record.name).await.into_iter().map(|e| e.token).collect();
            let recorded: Vec<String> = record.tokens().map(str::to_string).collect();
            assert_eq!(registered, recorded, "commands of {} disagree", record.name);
            owned.extend(registered);

            let stored = self.store.get(&record.name).await.unwrap();
            assert_eq!(stored.as_ref(), Some(record), "stored record of {} differs", record.name);
        }
        assert_eq!(owned, self.tokens().await, "registry holds commands of inactive extensions");

        let stored: Vec<String> =
            self.store.list_all().await.unwrap().into_iter().map(|r| r.name).collect();
        let active: Vec<String> = records.into_iter().map(|r| r.name).collect();
        assert_eq!(stored, active);
    }

    pub async fn send(&self, text: &str, reply_to: Option<Attachment>) -> sprocket_core::DispatchOutcome {
        self.agent.handle_message(MessageRef::new(1, 100), text, reply_to).await
    }

    /// Waits briefly so progress tasks can observe their stop signal.
    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
