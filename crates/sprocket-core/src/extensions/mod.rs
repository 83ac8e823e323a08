//! Extension lifecycle for Sprocket.
//!
//! Extensions are source files submitted at runtime. The [`ExtensionLoader`]
//! stages them, installs their dependencies, loads them through a
//! [`UnitLoader`], commits their commands to the registry and persists their
//! metadata, all or nothing.
//!
//! # Example
//!
//! ```rust,no_run
//! # use sprocket_core::extensions::ExtensionLoader;
//! # async fn demo(loader: &ExtensionLoader) -> Result<(), Box<dyn std::error::Error>> {
//! let source = std::fs::read("love.py")?;
//! let record = loader.submit(&source, "love.py", None).await?;
//! println!("Loaded {} with {} commands", record.name, record.commands.len());
//! # Ok(())
//! # }
//! ```

pub mod builtin;
mod loader;
mod locks;
pub mod python;
pub mod record;
mod resolve;
mod transaction;
pub mod unit;

pub use builtin::{HelpExtension, LoaderExtension};
pub use loader::{BootSummary, ExtensionLoader, RemovalOutcome};
pub use python::PythonUnitLoader;
pub use record::{CommandInfo, ExtensionRecord, ModuleInfo};
pub use resolve::resolve_name;
pub use unit::{ExtensionUnit, HostContext, UnitError, UnitLoader, UnitResult};

use crate::deps::DependencyReport;

/// Errors returned by extension lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// The submission was rejected before any state was created.
    #[error("validation error: {0}")]
    Validation(String),

    /// One or more packages failed to install.
    #[error(
        "dependency installation failed: {}",
        .report.failed.iter().map(|f| f.package.as_str()).collect::<Vec<_>>().join(", ")
    )]
    Dependency {
        /// Full installation report; partial installs are not undone.
        report: DependencyReport,
    },

    /// The unit could not be loaded, set up or persisted.
    #[error("load error: {0}")]
    Load(String),

    /// No active extension matches the query.
    #[error("extension not found: {0}")]
    NotFound(String),

    /// The extension is protected and cannot be replaced or removed.
    #[error("extension {0} is protected")]
    ProtectedModule(String),
}

impl ExtensionError {
    /// Short lines for the chat surface: the error plus up to `limit`
    /// package diagnostics.
    pub fn summary_lines(&self, limit: usize) -> Vec<String> {
        let mut lines = vec![self.to_string()];
        if let Self::Dependency { report } = self {
            lines.extend(report.error_summary(limit));
        }
        lines
    }
}

/// Result type for extension operations.
pub type Result<T> = std::result::Result<T, ExtensionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::PackageFailure;

    #[test]
    fn test_dependency_error_lists_packages() {
        let report = DependencyReport {
            installed: vec!["requests".to_string()],
            failed: vec![
                PackageFailure { package: "aaa".to_string(), error: "E1\nmore".to_string() },
                PackageFailure { package: "bbb".to_string(), error: "E2".to_string() },
            ],
        };
        let error = ExtensionError::Dependency { report };
        assert_eq!(error.to_string(), "dependency installation failed: aaa, bbb");
        assert_eq!(
            error.summary_lines(1),
            vec!["dependency installation failed: aaa, bbb".to_string(), "aaa: E1".to_string()]
        );
    }

    #[test]
    fn test_other_errors_have_single_line() {
        let error = ExtensionError::ProtectedModule("Loader".to_string());
        assert_eq!(error.summary_lines(3), vec!["extension Loader is protected".to_string()]);
    }
}
