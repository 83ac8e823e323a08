//! Package installation process boundary.

use async_trait::async_trait;
use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Probe run by the interpreter: prints every argument that can be imported.
const AVAILABILITY_PROBE: &str = "\
import importlib.util, sys
for name in sys.argv[1:]:
    try:
        if importlib.util.find_spec(name) is not None:
            print(name)
    except Exception:
        pass
";

/// Result of one installation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Package that was installed.
    pub package: String,
    /// Whether the installer exited successfully.
    pub success: bool,
    /// Exit code, if the process ran to completion.
    pub exit_code: Option<i32>,
    /// Captured diagnostic output (stderr, or stdout when stderr is empty).
    pub output: String,
}

impl InstallOutcome {
    /// Builds a failed outcome that never produced an exit code.
    pub fn failed(package: impl Into<String>, output: impl Into<String>) -> Self {
        Self { package: package.into(), success: false, exit_code: None, output: output.into() }
    }
}

/// External package installer.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Returns the subset of `identifiers` that can already be imported.
    async fn available(&self, identifiers: &[String]) -> HashSet<String>;

    /// Installs one package. Never retries.
    async fn install(&self, package: &str) -> InstallOutcome;
}

/// Installs packages with `<interpreter> -m pip install`.
#[derive(Debug, Clone)]
pub struct PipInstaller {
    interpreter: String,
    pip_args: Vec<String>,
    timeout: Option<Duration>,
}

impl PipInstaller {
    /// Creates an installer that runs the given interpreter.
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self { interpreter: interpreter.into(), pip_args: Vec::new(), timeout: None }
    }

    /// Extra arguments passed to `pip install` before the package name.
    #[must_use]
    pub fn with_pip_args(mut self, args: Vec<String>) -> Self {
        self.pip_args = args;
        self
    }

    /// Kills an installation that runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_pip(&self, package: &str) -> std::io::Result<std::process::Output> {
        let child = Command::new(&self.interpreter)
            .args(["-m", "pip", "install"])
            .args(&self.pip_args)
            .arg(package)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("installation timed out after {}s", limit.as_secs()),
                    )
                })?,
            None => child.wait_with_output().await,
        }
    }
}

#[async_trait]
impl PackageInstaller for PipInstaller {
    async fn available(&self, identifiers: &[String]) -> HashSet<String> {
        if identifiers.is_empty() {
            return HashSet::new();
        }

        let output = Command::new(&self.interpreter)
            .arg("-c")
            .arg(AVAILABILITY_PROBE)
            .args(identifiers)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!(interpreter = %self.interpreter, error = %e, "Availability probe failed");
                HashSet::new()
            }
        }
    }

    async fn install(&self, package: &str) -> InstallOutcome {
        debug!(package = %package, "Running pip install");

        match self.run_pip(package).await {
            Ok(output) if output.status.success() => {
                info!(package = %package, "Installed package");
                InstallOutcome {
                    package: package.to_string(),
                    success: true,
                    exit_code: output.status.code(),
                    output: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                }
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let text = if stderr.is_empty() {
                    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if stdout.is_empty() { "unknown error".to_string() } else { stdout }
                } else {
                    stderr
                };
                warn!(package = %package, code = ?output.status.code(), "Package installation failed");
                InstallOutcome {
                    package: package.to_string(),
                    success: false,
                    exit_code: output.status.code(),
                    output: text,
                }
            }
            Err(e) => {
                warn!(package = %package, error = %e, "Could not run package installer");
                InstallOutcome::failed(package, e.to_string())
            }
        }
    }
}
