//! Registry state store for installed packages and registered entities.
//!
//! The registry records which version of each package is installed, plus the
//! defaults and modules packages have contributed. It is an explicitly
//! constructed handle (created once near process start and threaded through
//! calls), holding in-memory state with a durable JSON backing file.
//!
//! The store is not safe for concurrent writers; callers serialize access.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::manifest::{DefaultEntry, ModuleEntry};
use crate::runtime::Runtime;

/// Installed-state record for one package.
///
/// Created on the first successful version application, updated after every
/// step, removed when an uninstall fully unwinds the chain. `version` is the
/// id of the currently-applied version.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Package {
    pub pack_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct RegistryState {
    #[serde(default)]
    packages: BTreeMap<String, Package>,
    #[serde(default)]
    defaults: BTreeMap<String, DefaultEntry>,
    #[serde(default)]
    modules: BTreeMap<String, ModuleEntry>,
}

/// The registry state store.
pub struct Registry<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
    state: RegistryState,
}

impl<'a, R: Runtime> Registry<'a, R> {
    /// Open the registry backed by the given file, loading existing state.
    /// A missing backing file opens as an empty registry.
    pub fn open(runtime: &'a R, path: PathBuf) -> Result<Self> {
        let mut registry = Self {
            runtime,
            path,
            state: RegistryState::default(),
        };
        registry.update()?;
        Ok(registry)
    }

    /// The durable backing file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn get_package(&self, pack_id: &str) -> Option<&Package> {
        self.state.packages.get(pack_id)
    }

    /// Upsert a package record by its `pack_id`.
    pub fn set_package(&mut self, package: Package) {
        self.state.packages.insert(package.pack_id.clone(), package);
    }

    /// Remove a package record. Removing an absent id is not an error.
    pub fn remove_package(&mut self, pack_id: &str) {
        self.state.packages.remove(pack_id);
    }

    /// Iterate all installed package records.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.state.packages.values()
    }

    /// Register a default, overwriting any entry with the same id.
    pub fn set_default(&mut self, default: DefaultEntry) {
        self.state.defaults.insert(default.def_id.clone(), default);
    }

    /// Remove a default by id, returning how many entries were removed (0 or 1).
    /// Callers treat 0 as "not found", which is non-fatal.
    pub fn remove_default(&mut self, def_id: &str) -> usize {
        usize::from(self.state.defaults.remove(def_id).is_some())
    }

    pub fn get_default(&self, def_id: &str) -> Option<&DefaultEntry> {
        self.state.defaults.get(def_id)
    }

    /// Register a module, overwriting any entry with the same id.
    pub fn set_module(&mut self, module: ModuleEntry) {
        self.state.modules.insert(module.lib_id.clone(), module);
    }

    /// Remove a module by id, returning how many entries were removed (0 or 1).
    pub fn remove_module(&mut self, lib_id: &str) -> usize {
        usize::from(self.state.modules.remove(lib_id).is_some())
    }

    pub fn get_module(&self, lib_id: &str) -> Option<&ModuleEntry> {
        self.state.modules.get(lib_id)
    }

    /// Durably persist the current in-memory state. Safe to call repeatedly.
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.state)?;
        self.runtime
            .write(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to save registry to {:?}", self.path))
    }

    /// Reload state from the durable store, discarding uncommitted in-memory
    /// changes. Used defensively before each version step so concurrent
    /// external edits are observed.
    pub fn update(&mut self) -> Result<()> {
        if !self.runtime.exists(&self.path) {
            self.state = RegistryState::default();
            return Ok(());
        }
        let content = self
            .runtime
            .read_to_string(&self.path)
            .with_context(|| format!("Failed to read registry from {:?}", self.path))?;
        self.state = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse registry at {:?}", self.path))?;
        Ok(())
    }
}
