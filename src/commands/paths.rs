use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Default install root: `~/.verstep`.
pub fn default_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let home = runtime
        .home_dir()
        .context("Failed to determine home directory")?;
    Ok(home.join(".verstep"))
}

pub fn resolve_root<R: Runtime>(runtime: &R, install_root: Option<PathBuf>) -> Result<PathBuf> {
    match install_root {
        Some(path) => Ok(path),
        None => default_root(runtime),
    }
}

/// The registry backing file lives directly under the install root.
pub fn registry_path(root: &Path) -> PathBuf {
    root.join("registry.json")
}
