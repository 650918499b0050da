use anyhow::Result;
use reqwest::Client;
use std::path::{Path, PathBuf};

use crate::fetch::HttpFetcher;
use crate::http::HttpClient;
use crate::manifest::PackageManifest;
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::transition::Resolver;

use super::{registry_path, resolve_root};

/// Apply a manifest, transitioning its package to `target` (latest when not
/// given).
#[tracing::instrument(skip(runtime, install_root))]
pub async fn apply<R: Runtime + 'static>(
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
    let mut registry = Registry::open(&runtime, registry_path(&root))?;

    println!("   resolving {} -> {}", manifest.package.name, target);

    let fetcher = HttpFetcher::new(&runtime, HttpClient::new(Client::new()));
    let resolver = Resolver::new(&runtime, &fetcher, root.clone());
    let outcome = resolver
        .resolve(&mut registry, &manifest, Some(&target))
        .await?;

    for diagnostic in &outcome.diagnostics {
        eprintln!("Warning: {}", diagnostic);
    }

    println!(
        "   installed {} {} {}",
        manifest.package.name,
        target,
        root.display()
    );

    Ok(())
}
