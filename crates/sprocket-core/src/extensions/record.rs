//! Extension metadata records.
//!
//! A record exists exactly while its unit is loaded and its commands are in
//! the registry. It is the persisted view of an active extension.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Version assigned when an extension does not report one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Developer assigned when an extension does not report one.
pub const DEFAULT_DEVELOPER: &str = "@sprocket";

/// Description used for commands without one.
pub const NO_DESCRIPTION: &str = "No description";

/// A command exposed by an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    /// Command token.
    #[serde(alias = "command")]
    pub token: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

impl CommandInfo {
    /// Creates a command entry.
    pub fn new(token: impl Into<String>, description: impl Into<String>) -> Self {
        Self { token: token.into(), description: description.into() }
    }
}

/// Metadata an extension reports about itself.
///
/// Every field is optional; missing values are synthesized when the record
/// is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// Version string.
    #[serde(default)]
    pub version: Option<String>,

    /// Developer handle.
    #[serde(default)]
    pub developer: Option<String>,

    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,

    /// Commands the extension says it provides.
    #[serde(default)]
    pub commands: Vec<CommandInfo>,
}

impl ModuleInfo {
    /// Reported description for `token`, if the self-report lists it.
    pub fn command_description(&self, token: &str) -> Option<&str> {
        self.commands
            .iter()
            .find(|c| c.token.eq_ignore_ascii_case(token))
            .map(|c| c.description.as_str())
            .filter(|d| !d.is_empty())
    }
}

/// Persisted metadata of an active extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    /// Canonical name (unique, ignoring case).
    pub name: String,

    /// Version string.
    pub version: String,

    /// Developer handle.
    pub developer: String,

    /// Free-text description.
    pub description: String,

    /// Commands in registration order.
    pub commands: Vec<CommandInfo>,

    /// Protected extensions can never be replaced or removed.
    pub is_protected: bool,

    /// Source file in the extensions directory; `None` for built-ins.
    pub backing_file_path: Option<PathBuf>,

    /// When the extension became active.
    pub loaded_at: DateTime<Utc>,
}

impl ExtensionRecord {
    /// Builds a record from what the unit registered and what it reported.
    ///
    /// `registered` is authoritative for the command list; the self-report
    /// only contributes descriptions and top-level metadata.
    pub fn build(
        name: &str,
        registered: &[(String, String)],
        info: Option<&ModuleInfo>,
        description: Option<String>,
        backing_file_path: Option<PathBuf>,
    ) -> Self {
        let commands = registered
            .iter()
            .map(|(token, registered_description)| {
                let description = info
                    .and_then(|i| i.command_description(token))
                    .map(str::to_string)
                    .or_else(|| {
                        Some(registered_description.clone()).filter(|d| !d.is_empty())
                    })
                    .unwrap_or_else(|| NO_DESCRIPTION.to_string());
                CommandInfo::new(token.clone(), description)
            })
            .collect();

        let reported = |value: Option<&String>| value.filter(|v| !v.trim().is_empty()).cloned();

        Self {
            name: name.to_string(),
            version: reported(info.and_then(|i| i.version.as_ref()))
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            developer: reported(info.and_then(|i| i.developer.as_ref()))
                .unwrap_or_else(|| DEFAULT_DEVELOPER.to_string()),
            description: reported(info.and_then(|i| i.description.as_ref()))
                .or(description)
                .unwrap_or_default(),
            commands,
            is_protected: false,
            backing_file_path,
            loaded_at: Utc::now(),
        }
    }

    /// Marks the record as protected.
    #[must_use]
    pub fn protected(mut self) -> Self {
        self.is_protected = true;
        self
    }

    /// Command tokens in order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.token.as_str())
    }
}
