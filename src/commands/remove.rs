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

/// Remove a manifest's package, unwinding every installed version.
#[tracing::instrument(skip(runtime, install_root))]
pub async fn remove<R: Runtime + 'static>(
    runtime: R,
    manifest_path: &Path,
    install_root: Option<PathBuf>,
) -> Result<()> {
    let manifest = PackageManifest::load(&runtime, manifest_path)?;

    let root = resolve_root(&runtime, install_root)?;
    let mut registry = Registry::open(&runtime, registry_path(&root))?;

    if registry.get_package(&manifest.package.pack_id).is_none() {
        anyhow::bail!("Package {} is not installed.", manifest.package.name);
    }

    let fetcher = HttpFetcher::new(&runtime, HttpClient::new(Client::new()));
    let resolver = Resolver::new(&runtime, &fetcher, root);
    let outcome = resolver.resolve(&mut registry, &manifest, None).await?;

    for diagnostic in &outcome.diagnostics {
        eprintln!("Warning: {}", diagnostic);
    }

    println!("   removed {}", manifest.package.name);

    Ok(())
}
