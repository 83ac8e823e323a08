//! Scan command implementation.

use anyhow::Context;
use colored::Colorize;
use sprocket_core::Config;
use sprocket_core::deps::{DependencyResolver, InstallOutcome, PackageInstaller};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Resolver used only for its pure scanning half.
struct NoInstall;

#[async_trait::async_trait]
impl PackageInstaller for NoInstall {
    async fn available(&self, identifiers: &[String]) -> HashSet<String> {
        identifiers.iter().cloned().collect()
    }

    async fn install(&self, package: &str) -> InstallOutcome {
        InstallOutcome::failed(package, "scan never installs")
    }
}

/// Execute the scan command.
///
/// Lists the external modules a source file imports and the package each
/// would be installed as. Nothing is executed or installed.
pub fn execute(config: &Config, file: &Path, json_output: bool) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let resolver = DependencyResolver::new(Arc::new(NoInstall))
        .with_aliases(config.dependencies.alias_table())
        .with_provided(config.dependencies.provided.clone());

    let identifiers = resolver.scan(&source);
    if json_output {
        let entries: Vec<_> = identifiers
            .iter()
            .map(|id| serde_json::json!({ "module": id, "package": resolver.package_name(id) }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if identifiers.is_empty() {
        println!("{}", "No external dependencies".green());
        return Ok(());
    }
    for identifier in &identifiers {
        let package = resolver.package_name(identifier);
        if package == identifier {
            println!("{identifier}");
        } else {
            println!("{identifier} -> {package}");
        }
    }
    Ok(())
}
