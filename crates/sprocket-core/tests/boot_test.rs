//! Integration tests for loading installed extensions at startup.

mod common;

use common::{CountingInstaller, FlakyStore, TestHost};
use sprocket_core::{ExtensionMetadataStore, ExtensionRecord};
use std::sync::Arc;

#[tokio::test]
async fn test_boot_loads_sources_and_prunes_stale_records() {
    let dir = tempfile::tempdir().unwrap();
    let extensions = dir.path().join("extensions");
    std::fs::create_dir_all(&extensions).unwrap();
    std::fs::write(extensions.join("Love.py"), "command love1 Classic\n").unwrap();
    std::fs::write(extensions.join("Broken.py"), "missing setup\n").unwrap();
    std::fs::write(extensions.join("notes.txt"), "command nope Nope\n").unwrap();

    let store = Arc::new(FlakyStore::default());
    store.upsert(&ExtensionRecord::build("Ghost", &[], None, None, None)).await.unwrap();

    let host = TestHost::start_in(dir, CountingInstaller::default(), store).await;
    let boot = host.agent.boot_summary();

    assert_eq!(boot.loaded, vec!["Love".to_string()]);
    assert_eq!(boot.failed.len(), 1);
    assert_eq!(boot.failed[0].0, "Broken");
    assert_eq!(boot.pruned, vec!["Ghost".to_string()]);

    assert!(host.extensions_dir().join("Broken.py").exists());
    assert!(host.store.get("Ghost").await.unwrap().is_none());
    assert!(host.agent.registry().lookup("love1").await.is_some());
    assert!(host.agent.registry().lookup("nope").await.is_none());
    host.assert_consistent().await;
}

#[tokio::test]
async fn test_boot_registers_protected_builtins() {
    let host = TestHost::start().await;
    let loader = host.agent.loader();

    for name in ["Help", "Loader"] {
        let record = loader.get(name).await.unwrap();
        assert!(record.is_protected, "{name} should be protected");
        assert!(record.backing_file_path.is_none());
    }
    let tokens = host.tokens().await;
    for token in ["help", "lm", "ulm"] {
        assert!(tokens.contains(token), "missing {token}");
    }
    assert!(host.agent.boot_summary().loaded.is_empty());
    host.assert_consistent().await;
}

#[tokio::test]
async fn test_boot_skips_sources_named_after_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let extensions = dir.path().join("extensions");
    std::fs::create_dir_all(&extensions).unwrap();
    std::fs::write(extensions.join("Help.py"), "command help Hijack\n").unwrap();

    let host = TestHost::start_in(dir, CountingInstaller::default(), Arc::default()).await;

    assert_eq!(host.agent.boot_summary().failed[0].0, "Help");
    let entry = host.agent.registry().lookup("help").await.unwrap();
    assert_eq!(entry.owner, "Help");
    assert_ne!(entry.description, "Hijack");
    host.assert_consistent().await;
}

#[tokio::test]
async fn test_boot_scan_skips_directories_and_prepares_staging() {
    let dir = tempfile::tempdir().unwrap();
    let extensions = dir.path().join("extensions");
    std::fs::create_dir_all(extensions.join("Nested.py")).unwrap();
    std::fs::write(extensions.join("Love.py"), "command love1 Classic\n").unwrap();
    std::fs::write(extensions.join("Zeta.py"), "command zeta Zeta\n").unwrap();

    let host = TestHost::start_in(dir, CountingInstaller::default(), Arc::new(FlakyStore::default())).await;
    let boot = host.agent.boot_summary();

    assert_eq!(boot.loaded, vec!["Love".to_string(), "Zeta".to_string()]);
    assert!(boot.failed.is_empty());
    assert!(host.staging_dir().is_dir());
    assert!(TestHost::listing(&host.staging_dir()).is_empty());
    host.assert_consistent().await;
}
