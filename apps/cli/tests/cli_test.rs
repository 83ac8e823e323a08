//! Integration tests for the `sprocket` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes a config rooted in `dir` and returns its path.
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("sprocket.toml");
    let content = format!(
        "[paths]\nextensions_dir = \"{}\"\nstaging_dir = \"{}\"\ndatabase = \"{}\"\n",
        dir.join("extensions").display(),
        dir.join("staging").display(),
        dir.join("data").join("sprocket.db").display(),
    );
    std::fs::write(&path, content).unwrap();
    path
}

fn sprocket() -> Command {
    let mut cmd = Command::cargo_bin("sprocket").unwrap();
    cmd.env_remove("SPROCKET_EXTENSIONS_DIR").env_remove("SPROCKET_DATABASE").env_remove("SPROCKET_PREFIX");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    sprocket()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("load"))
        .stdout(predicate::str::contains("unload"))
        .stdout(predicate::str::contains("shell"));
}

#[test]
fn test_scan_prints_external_imports() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path());
    let source = temp_dir.path().join("love.py");
    std::fs::write(&source, "import os\nimport requests\nfrom PIL import Image\nfrom . import local\n")
        .unwrap();

    sprocket()
        .arg("--config")
        .arg(&config)
        .arg("scan")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("requests"))
        .stdout(predicate::str::contains("PIL -> pillow"))
        .stdout(predicate::str::contains("os\n").not())
        .stdout(predicate::str::contains("local").not());
}

#[test]
fn test_scan_json_output() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path());
    let source = temp_dir.path().join("img.py");
    std::fs::write(&source, "import cv2\n").unwrap();

    let assert = sprocket()
        .arg("--config")
        .arg(&config)
        .arg("scan")
        .arg("--json")
        .arg(&source)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed[0]["module"], "cv2");
    assert_eq!(parsed[0]["package"], "opencv-python");
}

#[test]
fn test_scan_stdlib_only() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path());
    let source = temp_dir.path().join("plain.py");
    std::fs::write(&source, "import json\nimport asyncio\n").unwrap();

    sprocket()
        .arg("--config")
        .arg(&config)
        .arg("scan")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("No external dependencies"));
}

#[test]
fn test_list_empty_database() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path());

    sprocket()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No extensions installed."));
    assert!(temp_dir.path().join("data").join("sprocket.db").exists());
}

#[test]
fn test_list_json_empty() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path());

    sprocket()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_missing_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    sprocket()
        .arg("--config")
        .arg(temp_dir.path().join("absent.toml"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_invalid_config_value_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("bad.toml");
    std::fs::write(&config, "[extensions]\nfuzzy_threshold = 3.0\n").unwrap();

    sprocket()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("fuzzy_threshold"));
}
