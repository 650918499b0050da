//! Package manifest data model.
//!
//! A manifest is an immutable, externally supplied description of a package:
//! its identity, where its files live, and a linked chain of versions with
//! the change-set each version applies. The manifest is read-only input to a
//! transition; installed state lives in the registry.

mod version;

pub use version::{ChangeSet, DefaultEntry, ModuleEntry, Version};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::runtime::Runtime;

/// Package identity and metadata carried by a manifest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PackageInfo {
    pub pack_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_uri: Option<String>,
}

/// A package's full version history and effect declarations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PackageManifest {
    pub package: PackageInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Base URI version payload files are fetched from.
    pub package_uri: String,
    #[serde(default)]
    pub versions: Vec<Version>,
}

impl PackageManifest {
    /// Load and parse a manifest from a local JSON file.
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read manifest from {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest from {:?}", path))
    }

    /// Look up a version by id. Ids are expected to be unique; the first
    /// match wins.
    pub fn version(&self, id: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// The newest version: the one no other version names as its parent.
    ///
    /// Returns `None` for an empty manifest. With a clean linear chain there
    /// is exactly one such version.
    pub fn latest(&self) -> Option<&Version> {
        self.versions
            .iter()
            .find(|v| !self.versions.iter().any(|o| o.parent.as_deref() == Some(v.id.as_str())))
    }
}
