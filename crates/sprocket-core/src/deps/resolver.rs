//! Dependency resolution for submitted extension sources.

use super::installer::PackageInstaller;
use super::scanner::scan_imports;
use super::stdlib::is_stdlib_module;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// A package that failed to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFailure {
    /// Installable package name.
    pub package: String,
    /// Diagnostic text captured from the installer.
    pub error: String,
}

/// Outcome of resolving one source file's dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    /// Packages installed during this resolution.
    pub installed: Vec<String>,
    /// Packages that could not be installed.
    pub failed: Vec<PackageFailure>,
}

impl DependencyReport {
    /// True when no package failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// One `package: first line` entry per failure, at most `limit` of them.
    pub fn error_summary(&self, limit: usize) -> Vec<String> {
        self.failed
            .iter()
            .take(limit)
            .map(|f| {
                let first = f.error.lines().find(|l| !l.trim().is_empty()).unwrap_or("unknown error");
                format!("{}: {}", f.package, first.trim())
            })
            .collect()
    }
}

/// Scans sources for external imports and installs what is missing.
pub struct DependencyResolver {
    aliases: HashMap<String, String>,
    provided: HashSet<String>,
    installer: Arc<dyn PackageInstaller>,
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("aliases", &self.aliases)
            .field("provided", &self.provided)
            .finish_non_exhaustive()
    }
}

impl DependencyResolver {
    /// Creates a resolver with an identity alias table.
    pub fn new(installer: Arc<dyn PackageInstaller>) -> Self {
        Self { aliases: HashMap::new(), provided: HashSet::new(), installer }
    }

    /// Sets the import-name → package-name alias table.
    #[must_use]
    pub fn with_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Names supplied by the host itself; never installed.
    #[must_use]
    pub fn with_provided<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provided = names.into_iter().map(Into::into).collect();
        self
    }

    /// External (non-stdlib) modules referenced by `source`. Pure.
    pub fn scan(&self, source: &str) -> BTreeSet<String> {
        scan_imports(source).into_iter().filter(|name| !is_stdlib_module(name)).collect()
    }

    /// Installable package name for an import name.
    pub fn package_name<'a>(&'a self, identifier: &'a str) -> &'a str {
        self.aliases.get(identifier).map_or(identifier, String::as_str)
    }

    /// Installs every identifier that cannot already be imported.
    ///
    /// All packages are attempted even when one fails. When nothing needs
    /// installing no installer process is started.
    pub async fn resolve(&self, identifiers: &BTreeSet<String>) -> DependencyReport {
        let candidates: Vec<String> = identifiers
            .iter()
            .filter(|name| !is_stdlib_module(name) && !self.provided.contains(*name))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return DependencyReport::default();
        }

        let available = self.installer.available(&candidates).await;
        let missing: Vec<&String> = candidates.iter().filter(|n| !available.contains(*n)).collect();
        if missing.is_empty() {
            debug!(count = candidates.len(), "All dependencies already available");
            return DependencyReport::default();
        }

        let mut packages: Vec<&str> = Vec::new();
        for identifier in missing {
            let package = self.package_name(identifier);
            if !packages.contains(&package) {
                packages.push(package);
            }
        }

        info!(packages = ?packages, "Installing missing dependencies");
        let mut report = DependencyReport::default();
        for package in packages {
            let outcome = self.installer.install(package).await;
            if outcome.success {
                report.installed.push(outcome.package);
            } else {
                report.failed.push(PackageFailure { package: outcome.package, error: outcome.output });
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::installer::InstallOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeInstaller {
        available: HashSet<String>,
        broken: HashSet<String>,
        probes: Mutex<usize>,
        installs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PackageInstaller for FakeInstaller {
        async fn available(&self, identifiers: &[String]) -> HashSet<String> {
            *self.probes.lock().unwrap() += 1;
            identifiers.iter().filter(|i| self.available.contains(*i)).cloned().collect()
        }

        async fn install(&self, package: &str) -> InstallOutcome {
            self.installs.lock().unwrap().push(package.to_string());
            if self.broken.contains(package) {
                InstallOutcome {
                    package: package.to_string(),
                    success: false,
                    exit_code: Some(1),
                    output: format!("ERROR: No matching distribution found for {package}\nmore"),
                }
            } else {
                InstallOutcome {
                    package: package.to_string(),
                    success: true,
                    exit_code: Some(0),
                    output: String::new(),
                }
            }
        }
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_scan_filters_stdlib() {
        let resolver = DependencyResolver::new(Arc::new(FakeInstaller::default()));
        let source = "import os, sys\nimport requests\nfrom PIL import Image\nfrom asyncio import sleep\n";
        assert_eq!(resolver.scan(source), names(&["PIL", "requests"]));
    }

    #[tokio::test]
    async fn test_no_identifiers_spawns_nothing() {
        let installer = Arc::new(FakeInstaller::default());
        let resolver = DependencyResolver::new(installer.clone());
        let report = resolver.resolve(&BTreeSet::new()).await;
        assert_eq!(report, DependencyReport::default());
        assert_eq!(*installer.probes.lock().unwrap(), 0);
        assert!(installer.installs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_available_identifiers_are_not_installed() {
        let installer = Arc::new(FakeInstaller {
            available: names(&["requests"]).into_iter().collect(),
            ..Default::default()
        });
        let resolver = DependencyResolver::new(installer.clone());
        let report = resolver.resolve(&names(&["requests"])).await;
        assert!(report.is_success());
        assert!(report.installed.is_empty());
        assert!(installer.installs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provided_names_skip_probe() {
        let installer = Arc::new(FakeInstaller::default());
        let resolver = DependencyResolver::new(installer.clone()).with_provided(["telethon"]);
        let report = resolver.resolve(&names(&["telethon"])).await;
        assert!(report.is_success());
        assert_eq!(*installer.probes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_aliases_map_to_package_names() {
        let installer = Arc::new(FakeInstaller::default());
        let aliases = HashMap::from([
            ("PIL".to_string(), "pillow".to_string()),
            ("yaml".to_string(), "pyyaml".to_string()),
        ]);
        let resolver = DependencyResolver::new(installer.clone()).with_aliases(aliases);
        let report = resolver.resolve(&names(&["PIL", "yaml", "requests"])).await;

        assert_eq!(report.installed, vec!["pillow", "pyyaml", "requests"]);
        assert_eq!(*installer.installs.lock().unwrap(), vec!["pillow", "pyyaml", "requests"]);
    }

    #[tokio::test]
    async fn test_all_packages_attempted_after_failure() {
        let installer = Arc::new(FakeInstaller {
            broken: names(&["aaa", "bbb"]).into_iter().collect(),
            ..Default::default()
        });
        let resolver = DependencyResolver::new(installer.clone());
        let report = resolver.resolve(&names(&["aaa", "bbb", "ccc"])).await;

        assert!(!report.is_success());
        assert_eq!(report.installed, vec!["ccc"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(installer.installs.lock().unwrap().len(), 3);
        assert_eq!(
            report.error_summary(1),
            vec!["aaa: ERROR: No matching distribution found for aaa".to_string()]
        );
    }

    #[tokio::test]
    async fn test_shared_alias_installs_once() {
        let installer = Arc::new(FakeInstaller::default());
        let aliases = HashMap::from([
            ("google".to_string(), "protobuf".to_string()),
            ("protobuf".to_string(), "protobuf".to_string()),
        ]);
        let resolver = DependencyResolver::new(installer.clone()).with_aliases(aliases);
        resolver.resolve(&names(&["google", "protobuf"])).await;
        assert_eq!(*installer.installs.lock().unwrap(), vec!["protobuf"]);
    }
}
