//! Dependency analysis and installation for submitted extensions.
//!
//! Sources are scanned statically, standard-library modules are filtered out,
//! and whatever the interpreter cannot already import is installed through a
//! [`PackageInstaller`].

mod installer;
mod resolver;
mod scanner;
mod stdlib;

pub use installer::{InstallOutcome, PackageInstaller, PipInstaller};
pub use resolver::{DependencyReport, DependencyResolver, PackageFailure};
pub use scanner::scan_imports;
pub use stdlib::is_stdlib_module;

use std::collections::HashMap;

/// Import names whose installable package differs.
pub fn default_aliases() -> HashMap<String, String> {
    [
        ("PIL", "pillow"),
        ("cv2", "opencv-python"),
        ("yaml", "pyyaml"),
        ("bs4", "beautifulsoup4"),
        ("mysql", "mysql-connector-python"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
