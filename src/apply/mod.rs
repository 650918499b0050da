//! Change-set applier.
//!
//! Applies one version's `create`/`remove` effects against the install root
//! and the registry. Per-item delete and fetch failures are soft: they are
//! logged, recorded as [`Diagnostic`] values on the returned [`StepReport`],
//! and the step continues. A path guard violation is a hard failure that
//! aborts the whole version step immediately.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{error, info, warn};

use crate::fetch::FileFetcher;
use crate::guard::resolve_under;
use crate::manifest::Version;
use crate::registry::Registry;
use crate::runtime::Runtime;

/// What went wrong for one non-fatal sub-item.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    /// A file delete failed (missing file or I/O error).
    RemoveFailed,
    /// A file fetch or write failed.
    FetchFailed,
    /// A default/module removal found nothing to remove.
    NotFound,
}

/// A non-fatal failure recorded while applying a version step.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The file path or entity id the failure refers to.
    pub subject: String,
    pub detail: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            DiagnosticKind::RemoveFailed => {
                write!(f, "could not remove '{}': {}", self.subject, self.detail)
            }
            DiagnosticKind::FetchFailed => {
                write!(f, "could not fetch '{}': {}", self.subject, self.detail)
            }
            DiagnosticKind::NotFound => {
                write!(f, "'{}' not found for removal", self.subject)
            }
        }
    }
}

/// Outcome of one applied version step: success plus any non-fatal failures.
#[derive(Debug, Default)]
pub struct StepReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl StepReport {
    fn push(&mut self, kind: DiagnosticKind, subject: impl Into<String>, detail: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        });
    }
}

/// Applies a single version's change-sets.
pub struct Applier<'a, R: Runtime, F: FileFetcher> {
    runtime: &'a R,
    fetcher: &'a F,
}

impl<'a, R: Runtime, F: FileFetcher> Applier<'a, R, F> {
    pub fn new(runtime: &'a R, fetcher: &'a F) -> Self {
        Self { runtime, fetcher }
    }

    /// Apply a version's effects for an install transition: `remove` first,
    /// then `create`.
    pub async fn apply_install(
        &self,
        registry: &mut Registry<'_, R>,
        root: &Path,
        package_uri: &str,
        version: &Version,
    ) -> Result<StepReport> {
        // Flush and reload so concurrent external edits are observed before
        // this step mutates anything.
        registry.write()?;
        registry.update()?;

        info!("Installing version: {}", version.id);
        let mut report = StepReport::default();

        if let Some(remove) = &version.remove {
            for file in &remove.files {
                let path = self.guarded(root, file)?;
                self.delete_file(&path, file, &mut report);
            }
            for def in &remove.defaults {
                info!("Removing Default: {}", def.name);
                if registry.remove_default(&def.def_id) == 0 {
                    warn!("Default not found for removal: {}", def.def_id);
                    report.push(DiagnosticKind::NotFound, &def.def_id, "default");
                }
            }
            for module in &remove.modules {
                info!("Removing Module: {}", module.name);
                if registry.remove_module(&module.lib_id) == 0 {
                    warn!("Module not found for removal: {}", module.lib_id);
                    report.push(DiagnosticKind::NotFound, &module.lib_id, "module");
                }
            }
        }

        if let Some(create) = &version.create {
            for file in &create.files {
                let local = self.guarded(root, file)?;
                self.fetch_file(package_uri, &version.version_uri, file, &local, &mut report)
                    .await;
            }
            for def in &create.defaults {
                info!("Creating Default: {}", def.name);
                registry.set_default(def.clone());
            }
            for module in &create.modules {
                info!("Creating Module: {}", module.name);
                registry.set_module(module.clone());
            }
        }

        registry.write()?;
        Ok(report)
    }

    /// Undo a version's effects for an uninstall transition: its `create`
    /// files are deleted and its `create` entities are deregistered.
    pub async fn apply_uninstall(
        &self,
        registry: &mut Registry<'_, R>,
        root: &Path,
        version: &Version,
    ) -> Result<StepReport> {
        registry.write()?;
        registry.update()?;

        info!("Uninstalling version: {}", version.id);
        let mut report = StepReport::default();

        if let Some(create) = &version.create {
            for file in &create.files {
                let path = self.guarded(root, file)?;
                self.delete_file(&path, file, &mut report);
            }
            for def in &create.defaults {
                info!("Removing Default: {}", def.name);
                if registry.remove_default(&def.def_id) == 0 {
                    warn!("Default not found for removal: {}", def.def_id);
                    report.push(DiagnosticKind::NotFound, &def.def_id, "default");
                }
            }
            for module in &create.modules {
                info!("Removing Module: {}", module.name);
                if registry.remove_module(&module.lib_id) == 0 {
                    warn!("Module not found for removal: {}", module.lib_id);
                    report.push(DiagnosticKind::NotFound, &module.lib_id, "module");
                }
            }
        }

        registry.write()?;
        Ok(report)
    }

    /// Resolve a change-set file under the root, turning an escape into a
    /// hard step abort.
    fn guarded(&self, root: &Path, file: &str) -> Result<PathBuf> {
        resolve_under(root, file).map_err(|escape| {
            error!("Illegal file path, aborting version change.");
            error!("  File: {}", file);
            anyhow::Error::from(escape)
        })
    }

    fn delete_file(&self, path: &Path, file: &str, report: &mut StepReport) {
        match self.runtime.remove_file(path) {
            Ok(()) => info!("Removed file: {}", path.display()),
            Err(e) => {
                warn!("Error removing file, it may need to be removed manually.");
                warn!("  File: {}", file);
                warn!("  Error: {}", e);
                report.push(DiagnosticKind::RemoveFailed, file, e.to_string());
            }
        }
    }

    async fn fetch_file(
        &self,
        package_uri: &str,
        version_uri: &str,
        file: &str,
        local: &Path,
        report: &mut StepReport,
    ) {
        // Version payloads are published flat under the version URI, so only
        // the basename participates in the source URL.
        let basename = Path::new(file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string());
        let url = format!("{}/{}/{}", package_uri, version_uri, basename);

        if let Some(parent) = local.parent()
            && !self.runtime.exists(parent)
            && let Err(e) = self.runtime.create_dir_all(parent)
        {
            warn!("Error preparing directory for {}: {}", local.display(), e);
            report.push(DiagnosticKind::FetchFailed, file, e.to_string());
            return;
        }

        info!("Downloading: {}", local.display());
        match self.fetcher.fetch(&url, local).await {
            Ok(bytes) => info!("  done ({} bytes).", bytes),
            Err(e) => {
                warn!("Error fetching file, this version may be incomplete.");
                warn!("  File: {}", file);
                warn!("  Error: {}", e);
                report.push(DiagnosticKind::FetchFailed, file, e.to_string());
            }
        }
    }
}
