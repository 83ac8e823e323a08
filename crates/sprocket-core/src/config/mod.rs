//! Configuration for Sprocket.
//!
//! Settings come from a TOML file (explicit path, `./sprocket.toml`, or
//! `~/.sprocket/config.toml`, first match wins) with a few environment
//! overrides applied on top.

use crate::deps::default_aliases;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `paths.extensions_dir`.
pub const ENV_EXTENSIONS_DIR: &str = "SPROCKET_EXTENSIONS_DIR";
/// Environment variable overriding `paths.database`.
pub const ENV_DATABASE: &str = "SPROCKET_DATABASE";
/// Environment variable overriding `bot.command_prefix`.
pub const ENV_PREFIX: &str = "SPROCKET_PREFIX";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Chat-facing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Prefix that marks a message as a command.
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
}

fn default_prefix() -> String {
    ".".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self { command_prefix: default_prefix() }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Live extension sources, one `<name>.py` per extension.
    #[serde(default = "default_extensions_dir")]
    pub extensions_dir: PathBuf,

    /// Downloads are staged here before validation.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// SQLite metadata database.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

fn default_extensions_dir() -> PathBuf {
    PathBuf::from("extensions")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("staging")
}

fn default_database() -> PathBuf {
    PathBuf::from("data").join("sprocket.db")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            extensions_dir: default_extensions_dir(),
            staging_dir: default_staging_dir(),
            database: default_database(),
        }
    }
}

/// Extension lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    /// Names that can never be replaced or removed (matched case-insensitively).
    #[serde(default = "default_protected")]
    pub protected: Vec<String>,

    /// Minimum similarity for fuzzy name resolution (0.0..=1.0).
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

fn default_protected() -> Vec<String> {
    ["Help", "System", "Loader", "Updater", "Configurator"].map(String::from).to_vec()
}

fn default_fuzzy_threshold() -> f64 {
    0.6
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self { protected: default_protected(), fuzzy_threshold: default_fuzzy_threshold() }
    }
}

impl ExtensionsConfig {
    /// Whether `name` is protected.
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected_name(name).is_some()
    }

    /// The protected entry matching `name`, spelled as configured.
    pub fn protected_name(&self, name: &str) -> Option<&str> {
        self.protected.iter().find(|p| p.eq_ignore_ascii_case(name)).map(String::as_str)
    }
}

/// Dependency installation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependenciesConfig {
    /// Interpreter used to probe, install and run extensions.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Per-package install timeout; unset means no limit.
    #[serde(default)]
    pub install_timeout_secs: Option<u64>,

    /// Extra arguments for `pip install`.
    #[serde(default)]
    pub pip_args: Vec<String>,

    /// Modules supplied by the host; never installed.
    #[serde(default)]
    pub provided: Vec<String>,

    /// Import name to package name overrides, merged over the built-in table.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            install_timeout_secs: None,
            pip_args: Vec::new(),
            provided: Vec::new(),
            aliases: HashMap::new(),
        }
    }
}

impl DependenciesConfig {
    /// Built-in aliases with configured overrides applied.
    pub fn alias_table(&self) -> HashMap<String, String> {
        let mut table = default_aliases();
        table.extend(self.aliases.clone());
        table
    }

    /// Install timeout, if configured.
    pub fn install_timeout(&self) -> Option<Duration> {
        self.install_timeout_secs.map(Duration::from_secs)
    }
}

/// Progress animation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Animation frames, cycled in order.
    #[serde(default = "default_frames")]
    pub frames: Vec<String>,

    /// Delay between frames in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_frames() -> Vec<String> {
    ["/", "-", "\\", "|"].map(String::from).to_vec()
}

fn default_interval_ms() -> u64 {
    300
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { frames: default_frames(), interval_ms: default_interval_ms() }
    }
}

impl ProgressConfig {
    /// Frame interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Chat-facing settings.
    #[serde(default)]
    pub bot: BotConfig,
    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Extension lifecycle settings.
    #[serde(default)]
    pub extensions: ExtensionsConfig,
    /// Dependency installation settings.
    #[serde(default)]
    pub dependencies: DependenciesConfig,
    /// Progress animation settings.
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        Self::from_toml(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".sprocket")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("sprocket.toml")
    }

    /// Loads configuration for a run.
    ///
    /// An explicit path must exist. Without one, the local file is tried,
    /// then the global file, then defaults. Environment overrides are
    /// applied last and the result is validated.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::discover()?,
        };
        config.apply_env_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn discover() -> ConfigResult<Self> {
        for path in [Self::default_local_path(), Self::default_global_path()] {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Applies overrides read through `lookup` (normally the process environment).
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = non_empty(ENV_EXTENSIONS_DIR) {
            self.paths.extensions_dir = PathBuf::from(dir);
        }
        if let Some(db) = non_empty(ENV_DATABASE) {
            self.paths.database = PathBuf::from(db);
        }
        if let Some(prefix) = non_empty(ENV_PREFIX) {
            self.bot.command_prefix = prefix;
        }
    }

    /// Checks values that would make the agent misbehave.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bot.command_prefix.is_empty() {
            return Err(ConfigError::InvalidValue("bot.command_prefix must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.extensions.fuzzy_threshold) {
            return Err(ConfigError::InvalidValue(format!(
                "extensions.fuzzy_threshold must be within 0.0..=1.0, got {}",
                self.extensions.fuzzy_threshold
            )));
        }
        if self.progress.frames.is_empty() {
            return Err(ConfigError::InvalidValue("progress.frames must not be empty".into()));
        }
        if self.progress.interval_ms == 0 {
            return Err(ConfigError::InvalidValue("progress.interval_ms must be positive".into()));
        }
        if self.dependencies.interpreter.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "dependencies.interpreter must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.bot.command_prefix, ".");
        assert_eq!(config.paths.extensions_dir, PathBuf::from("extensions"));
        assert_eq!(config.dependencies.interpreter, "python3");
        assert_eq!(config.dependencies.install_timeout(), None);
        assert_eq!(config.progress.interval(), Duration::from_millis(300));
        assert_eq!(config.progress.frames, vec!["/", "-", "\\", "|"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_protected_is_case_insensitive() {
        let config = ExtensionsConfig::default();
        assert!(config.is_protected("Loader"));
        assert!(config.is_protected("loader"));
        assert_eq!(config.protected_name("updater"), Some("Updater"));
        assert!(config.is_protected("HELP"));
        assert!(!config.is_protected("Love"));
    }

    #[test]
    fn test_config_deserialize_minimal() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_deserialize_partial_sections() {
        let config = Config::from_toml(
            r#"
            [bot]
            command_prefix = "!"

            [dependencies]
            install_timeout_secs = 120
            provided = ["telethon"]

            [dependencies.aliases]
            yaml = "ruamel.yaml"
            sklearn = "scikit-learn"
            "#,
        )
        .unwrap();

        assert_eq!(config.bot.command_prefix, "!");
        assert_eq!(config.dependencies.install_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.dependencies.interpreter, "python3");
        let aliases = config.dependencies.alias_table();
        assert_eq!(aliases["yaml"], "ruamel.yaml");
        assert_eq!(aliases["sklearn"], "scikit-learn");
        assert_eq!(aliases["PIL"], "pillow");
        assert_eq!(config.extensions, ExtensionsConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides_from(|key| match key {
            ENV_EXTENSIONS_DIR => Some("/srv/ext".to_string()),
            ENV_PREFIX => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.paths.extensions_dir, PathBuf::from("/srv/ext"));
        assert_eq!(config.bot.command_prefix, ".");
        assert_eq!(config.paths.database, default_database());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.extensions.fuzzy_threshold = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = Config::default();
        config.progress.frames.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprocket.toml");
        std::fs::write(&path, "[paths]\nextensions_dir = \"mods\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.paths.extensions_dir, PathBuf::from("mods"));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(Some(&missing)), Err(ConfigError::NotFound(_))));

        std::fs::write(&path, "[bot\n").unwrap();
        assert!(matches!(Config::load_from_file(&path), Err(ConfigError::ParseError(_))));
    }
}
