use anyhow::Result;
use std::path::PathBuf;

use crate::registry::Registry;
use crate::runtime::Runtime;

use super::{registry_path, resolve_root};

/// List all installed packages and their current versions.
#[tracing::instrument(skip(runtime, install_root))]
pub fn list<R: Runtime>(runtime: R, install_root: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(&runtime, install_root)?;
    let registry = Registry::open(&runtime, registry_path(&root))?;

    if registry.packages().count() == 0 {
        println!("No packages installed.");
        return Ok(());
    }

    for package in registry.packages() {
        println!(
            "{} {}",
            package.name,
            package.version.as_deref().unwrap_or("(unknown)")
        );
    }

    Ok(())
}
