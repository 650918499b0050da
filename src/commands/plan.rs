use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::manifest::PackageManifest;
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::transition::plan_chain;

use super::{registry_path, resolve_root};

/// Print the versions a transition would apply, in application order, without
/// touching the install root.
#[tracing::instrument(skip(runtime, install_root))]
pub fn plan<R: Runtime>(
    runtime: R,
    manifest_path: &Path,
    target: Option<&str>,
    install_root: Option<PathBuf>,
) -> Result<()> {
    let manifest = PackageManifest::load(&runtime, manifest_path)?;

    let target = match target {
        Some(id) => id.to_string(),
        None => manifest
            .latest()
            .map(|v| v.id.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("Manifest {:?} declares no versions", manifest_path)
            })?,
    };

    let root = resolve_root(&runtime, install_root)?;
    let registry = Registry::open(&runtime, registry_path(&root))?;
    let installed = registry
        .get_package(&manifest.package.pack_id)
        .and_then(|p| p.version.clone());

    let chain = plan_chain(&manifest, installed.as_deref(), Some(&target))?;
    if chain.is_empty() {
        println!(
            "{} is already at {}. Nothing to do.",
            manifest.package.name, target
        );
        return Ok(());
    }

    println!(
        "{} {} -> {}",
        manifest.package.name,
        installed.as_deref().unwrap_or("(none)"),
        target
    );
    for version in chain.iter().rev() {
        println!("  {}", version.id);
    }

    Ok(())
}
