//! Transition resolver.
//!
//! Computes the path through a manifest's version chain from the installed
//! version to the target version (or to/from "uninstalled") and drives the
//! change-set applier version by version, persisting registry progress after
//! every step. There is no rollback: a failed step records the last attempted
//! version as current and returns the failure, and a repeat resolve is the
//! recovery path.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use log::{info, warn};

use crate::apply::{Applier, Diagnostic};
use crate::fetch::FileFetcher;
use crate::manifest::{PackageManifest, Version};
use crate::registry::{Package, Registry};
use crate::runtime::Runtime;

/// Transition failures detected before or while walking the version chain.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionError {
    /// Neither an installed version nor anything to apply.
    InvalidRequest,
    /// The target cannot be reached by walking predecessors from the
    /// installed version (divergent branch, unknown id, or reversed order).
    UnreachableVersion {
        target: String,
        installed: Option<String>,
    },
    /// The manifest's parent links loop back on themselves.
    ManifestCycle { id: String },
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::InvalidRequest => {
                write!(f, "nothing to do: no installed version and no target to apply")
            }
            TransitionError::UnreachableVersion { target, installed } => match installed {
                Some(installed) => write!(
                    f,
                    "version '{}' is not reachable from installed version '{}'",
                    target, installed
                ),
                None => write!(f, "version '{}' is not present in the manifest", target),
            },
            TransitionError::ManifestCycle { id } => {
                write!(f, "manifest version chain cycles back to '{}'", id)
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Result of a successful transition.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Version ids applied, in application order.
    pub applied: Vec<String>,
    /// Non-fatal per-item failures accumulated across all steps.
    pub diagnostics: Vec<Diagnostic>,
}

/// Build the work chain for a transition, in stack order: the returned list
/// starts at the anchor (target if present, installed otherwise) and ends at
/// the oldest pending version. Apply in reverse.
///
/// With a target, the walk stops just short of the installed version, so an
/// already-achieved target yields an empty chain. Without a target (an
/// uninstall), the walk covers the installed version down to the chain root.
pub fn plan_chain<'m>(
    manifest: &'m PackageManifest,
    installed: Option<&str>,
    target: Option<&str>,
) -> Result<Vec<&'m Version>, TransitionError> {
    let Some(anchor) = target.or(installed) else {
        return Err(TransitionError::InvalidRequest);
    };

    if let Some(t) = target
        && manifest.version(t).is_none()
    {
        return Err(TransitionError::UnreachableVersion {
            target: t.to_string(),
            installed: installed.map(String::from),
        });
    }

    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = manifest.version(anchor);
    let mut reached_installed = false;

    while let Some(version) = current {
        if target.is_some() && installed == Some(version.id.as_str()) {
            // Exclusive: the already-installed version is not re-applied.
            reached_installed = true;
            break;
        }
        if !seen.insert(version.id.as_str()) {
            return Err(TransitionError::ManifestCycle {
                id: version.id.clone(),
            });
        }
        chain.push(version);
        current = version.parent.as_deref().and_then(|id| manifest.version(id));
    }

    if let Some(t) = target
        && installed.is_some()
        && !reached_installed
    {
        return Err(TransitionError::UnreachableVersion {
            target: t.to_string(),
            installed: installed.map(String::from),
        });
    }

    // Strict contract: an uninstall whose installed version is unknown to the
    // manifest has nothing to unwind and is rejected.
    if target.is_none() && chain.is_empty() {
        return Err(TransitionError::InvalidRequest);
    }

    Ok(chain)
}

/// Drives transitions for one package against one install root.
pub struct Resolver<'a, R: Runtime, F: FileFetcher> {
    runtime: &'a R,
    fetcher: &'a F,
    root: PathBuf,
}

impl<'a, R: Runtime, F: FileFetcher> Resolver<'a, R, F> {
    pub fn new(runtime: &'a R, fetcher: &'a F, root: PathBuf) -> Self {
        Self {
            runtime,
            fetcher,
            root,
        }
    }

    /// Transition the manifest's package to `target` (`None` = uninstall).
    ///
    /// Progress is persisted after every version step. Pre-flight rejections
    /// (invalid request, unreachable target, cyclic manifest) return before
    /// any mutation; once application begins, both success and failure leave
    /// the registry flushed with the last attempted version recorded.
    pub async fn resolve(
        &self,
        registry: &mut Registry<'_, R>,
        manifest: &PackageManifest,
        target: Option<&str>,
    ) -> Result<Outcome> {
        let pack_id = manifest.package.pack_id.clone();
        let installed = registry
            .get_package(&pack_id)
            .and_then(|p| p.version.clone());

        info!("Beginning update procedure.");
        info!("  Package: {}", manifest.package.name);

        let chain = plan_chain(manifest, installed.as_deref(), target)?;
        info!("{} updates to be applied.", chain.len());

        let applier = Applier::new(self.runtime, self.fetcher);
        let mut outcome = Outcome::default();
        let mut pack = Package {
            pack_id: pack_id.clone(),
            name: manifest.package.name.clone(),
            home_uri: manifest.package.home_uri.clone(),
            version: target.map(String::from),
        };

        // Oldest pending change first: pop the stack.
        for version in chain.iter().rev() {
            pack.version = Some(version.id.clone());

            let step = if target.is_none() {
                applier
                    .apply_uninstall(registry, &self.root, version)
                    .await
            } else {
                applier
                    .apply_install(registry, &self.root, &manifest.package_uri, version)
                    .await
            };

            match step {
                Ok(report) => {
                    outcome.applied.push(version.id.clone());
                    outcome.diagnostics.extend(report.diagnostics);
                }
                Err(e) => {
                    // Forward-only checkpoint: the failed step's version is
                    // recorded as current so a retry resumes from here.
                    registry.set_package(pack.clone());
                    if let Err(flush) = registry.write() {
                        warn!("Failed to flush registry after failed step: {:#}", flush);
                    }
                    return Err(e);
                }
            }
        }

        if target.is_none() {
            registry.remove_package(&pack_id);
        } else {
            pack.version = target.map(String::from);
            registry.set_package(pack);
        }
        registry.write()?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockFileFetcher;
    use crate::guard::PathEscape;
    use crate::manifest::{ChangeSet, PackageInfo};
    use crate::registry::Registry;
    use crate::runtime::RealRuntime;

    fn version(id: &str, parent: Option<&str>, files: &[&str]) -> Version {
        Version {
            id: id.into(),
            parent: parent.map(String::from),
            version_uri: id.into(),
            create: Some(ChangeSet {
                files: files.iter().map(|f| f.to_string()).collect(),
                ..Default::default()
            }),
            remove: None,
        }
    }

    fn manifest(versions: Vec<Version>) -> PackageManifest {
        PackageManifest {
            package: PackageInfo {
                pack_id: "7e4d9a".into(),
                name: "frost".into(),
                home_uri: None,
            },
            description: None,
            package_uri: "https://packs.example.com/frost".into(),
            versions,
        }
    }

    fn three_version_manifest() -> PackageManifest {
        manifest(vec![
            version("v3", Some("v2"), &["three.dll"]),
            version("v2", Some("v1"), &["two.dll"]),
            version("v1", None, &["one.dll"]),
        ])
    }

    // --- plan_chain ---

    #[test]
    fn test_plan_fresh_install_covers_whole_chain() {
        let m = three_version_manifest();
        let chain = plan_chain(&m, None, Some("v3")).unwrap();
        let ids: Vec<_> = chain.iter().map(|v| v.id.as_str()).collect();
        // Stack order: anchor first, apply in reverse
        assert_eq!(ids, vec!["v3", "v2", "v1"]);
    }

    #[test]
    fn test_plan_upgrade_stops_at_installed() {
        let m = three_version_manifest();
        let chain = plan_chain(&m, Some("v1"), Some("v3")).unwrap();
        let ids: Vec<_> = chain.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v3", "v2"]);
    }

    #[test]
    fn test_plan_achieved_target_is_empty() {
        let m = three_version_manifest();
        let chain = plan_chain(&m, Some("v3"), Some("v3")).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_plan_uninstall_unwinds_to_root() {
        let m = three_version_manifest();
        let chain = plan_chain(&m, Some("v2"), None).unwrap();
        let ids: Vec<_> = chain.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v2", "v1"]);
    }

    #[test]
    fn test_plan_rejects_empty_request() {
        let m = three_version_manifest();
        assert_eq!(
            plan_chain(&m, None, None).unwrap_err(),
            TransitionError::InvalidRequest
        );
    }

    #[test]
    fn test_plan_rejects_uninstall_of_unknown_installed() {
        let m = three_version_manifest();
        assert_eq!(
            plan_chain(&m, Some("v99"), None).unwrap_err(),
            TransitionError::InvalidRequest
        );
    }

    #[test]
    fn test_plan_unreachable_target() {
        // v3 is not an ancestor-reachable id from vX's chain
        let mut m = three_version_manifest();
        m.versions.push(version("vx", None, &[]));
        let err = plan_chain(&m, Some("vx"), Some("v3")).unwrap_err();
        assert_eq!(
            err,
            TransitionError::UnreachableVersion {
                target: "v3".into(),
                installed: Some("vx".into()),
            }
        );
    }

    #[test]
    fn test_plan_downgrade_is_unreachable() {
        // Walking predecessors from v1 never reaches v3
        let m = three_version_manifest();
        let err = plan_chain(&m, Some("v3"), Some("v1")).unwrap_err();
        assert!(matches!(err, TransitionError::UnreachableVersion { .. }));
    }

    #[test]
    fn test_plan_target_missing_from_manifest() {
        let m = three_version_manifest();
        let err = plan_chain(&m, None, Some("v9")).unwrap_err();
        assert_eq!(
            err,
            TransitionError::UnreachableVersion {
                target: "v9".into(),
                installed: None,
            }
        );
    }

    #[test]
    fn test_plan_detects_cycle() {
        let m = manifest(vec![
            version("a", Some("b"), &[]),
            version("b", Some("a"), &[]),
        ]);
        let err = plan_chain(&m, None, Some("a")).unwrap_err();
        assert!(matches!(err, TransitionError::ManifestCycle { .. }));
    }

    // --- resolve (real filesystem in a tempdir, mocked fetcher) ---

    fn fetcher_writing(content: &'static str) -> MockFileFetcher {
        let mut fetcher = MockFileFetcher::new();
        fetcher.expect_fetch().returning(move |_, dest| {
            std::fs::write(dest, content)?;
            Ok(content.len() as u64)
        });
        fetcher
    }

    #[tokio::test]
    async fn test_resolve_fresh_install_applies_root_to_tip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let runtime = RealRuntime;
        let fetcher = fetcher_writing("bytes");

        let m = three_version_manifest();
        let mut registry = Registry::open(&runtime, root.join("registry.json")).unwrap();
        let resolver = Resolver::new(&runtime, &fetcher, root.clone());

        let outcome = resolver
            .resolve(&mut registry, &m, Some("v3"))
            .await
            .unwrap();

        assert_eq!(outcome.applied, vec!["v1", "v2", "v3"]);
        assert!(outcome.diagnostics.is_empty());
        assert!(root.join("one.dll").exists());
        assert!(root.join("three.dll").exists());
        assert_eq!(
            registry.get_package("7e4d9a").unwrap().version.as_deref(),
            Some("v3")
        );
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let runtime = RealRuntime;

        let m = manifest(vec![
            version("v2", Some("v1"), &[]),
            version("v1", None, &[]),
        ]);

        let fetcher = fetcher_writing("");
        let mut registry = Registry::open(&runtime, root.join("registry.json")).unwrap();
        let resolver = Resolver::new(&runtime, &fetcher, root.clone());
        resolver
            .resolve(&mut registry, &m, Some("v2"))
            .await
            .unwrap();

        // Second resolve: empty work chain, zero applier invocations
        let mut strict = MockFileFetcher::new();
        strict.expect_fetch().never();
        let resolver = Resolver::new(&runtime, &strict, root.clone());
        let outcome = resolver
            .resolve(&mut registry, &m, Some("v2"))
            .await
            .unwrap();

        assert!(outcome.applied.is_empty());
        assert_eq!(
            registry.get_package("7e4d9a").unwrap().version.as_deref(),
            Some("v2")
        );
    }

    #[tokio::test]
    async fn test_resolve_uninstall_of_nothing_is_invalid_request() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let runtime = RealRuntime;
        let mut strict = MockFileFetcher::new();
        strict.expect_fetch().never();

        let m = three_version_manifest();
        let mut registry = Registry::open(&runtime, root.join("registry.json")).unwrap();
        let resolver = Resolver::new(&runtime, &strict, root.clone());

        let err = resolver.resolve(&mut registry, &m, None).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<TransitionError>(),
            Some(&TransitionError::InvalidRequest)
        );
        // No side effects: the registry file was never written
        assert!(!root.join("registry.json").exists());
    }

    #[tokio::test]
    async fn test_resolve_unreachable_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let runtime = RealRuntime;
        let fetcher = fetcher_writing("bytes");

        let m = three_version_manifest();
        let mut registry = Registry::open(&runtime, root.join("registry.json")).unwrap();
        let resolver = Resolver::new(&runtime, &fetcher, root.clone());
        resolver
            .resolve(&mut registry, &m, Some("v2"))
            .await
            .unwrap();

        // Downgrade target is not reachable by walking predecessors
        let err = resolver
            .resolve(&mut registry, &m, Some("v1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransitionError>(),
            Some(TransitionError::UnreachableVersion { .. })
        ));
        assert_eq!(
            registry.get_package("7e4d9a").unwrap().version.as_deref(),
            Some("v2")
        );
    }

    #[tokio::test]
    async fn test_resolve_partial_failure_checkpoints_last_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let runtime = RealRuntime;
        let fetcher = fetcher_writing("bytes");

        // v2's change-set escapes the root, forcing a hard step failure
        let m = manifest(vec![
            version("v3", Some("v2"), &["three.dll"]),
            version("v2", Some("v1"), &["../escape.dll"]),
            version("v1", None, &["one.dll"]),
        ]);

        let mut registry = Registry::open(&runtime, root.join("registry.json")).unwrap();
        let resolver = Resolver::new(&runtime, &fetcher, root.clone());
        let err = resolver
            .resolve(&mut registry, &m, Some("v3"))
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<PathEscape>().is_some());
        // v1 applied, v2 attempted and recorded, v3 never reached
        assert!(root.join("one.dll").exists());
        assert!(!root.join("three.dll").exists());
        assert_eq!(
            registry.get_package("7e4d9a").unwrap().version.as_deref(),
            Some("v2")
        );

        // The checkpoint is durable, not just in memory
        registry.update().unwrap();
        assert_eq!(
            registry.get_package("7e4d9a").unwrap().version.as_deref(),
            Some("v2")
        );
    }

    #[tokio::test]
    async fn test_resolve_uninstall_unwinds_and_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let runtime = RealRuntime;
        let fetcher = fetcher_writing("bytes");

        let m = manifest(vec![
            version("v2", Some("v1"), &["two.dll"]),
            version("v1", None, &["one.dll"]),
        ]);

        let mut registry = Registry::open(&runtime, root.join("registry.json")).unwrap();
        let resolver = Resolver::new(&runtime, &fetcher, root.clone());
        resolver
            .resolve(&mut registry, &m, Some("v2"))
            .await
            .unwrap();
        assert!(root.join("one.dll").exists());
        assert!(root.join("two.dll").exists());

        let outcome = resolver.resolve(&mut registry, &m, None).await.unwrap();
        assert_eq!(outcome.applied, vec!["v1", "v2"]);
        assert!(!root.join("one.dll").exists());
        assert!(!root.join("two.dll").exists());
        assert!(registry.get_package("7e4d9a").is_none());
    }

    #[tokio::test]
    async fn test_resolve_fetch_failures_are_soft() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let runtime = RealRuntime;

        let mut fetcher = MockFileFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));

        let m = manifest(vec![version("v1", None, &["one.dll"])]);
        let mut registry = Registry::open(&runtime, root.join("registry.json")).unwrap();
        let resolver = Resolver::new(&runtime, &fetcher, root.clone());

        let outcome = resolver
            .resolve(&mut registry, &m, Some("v1"))
            .await
            .unwrap();

        // The step completes even though the file never arrived
        assert_eq!(outcome.applied, vec!["v1"]);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(
            registry.get_package("7e4d9a").unwrap().version.as_deref(),
            Some("v1")
        );
    }
}
