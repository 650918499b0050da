//! Per-version change-set types.

use serde::{Deserialize, Serialize};

/// One version in a package's history.
///
/// Versions form a singly-linked chain: each version names its predecessor
/// through `parent`, and the oldest version has no parent. Branching history
/// is not supported; a version off the straight line from the installed
/// version is simply unreachable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Version {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Path segment under the manifest's package URI holding this version's files.
    #[serde(default)]
    pub version_uri: String,
    /// Effects applied when installing this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<ChangeSet>,
    /// Effects applied before `create` when installing this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<ChangeSet>,
}

/// The effect bundle attached to one side (`create` or `remove`) of a version.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    /// Install-root-relative file paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaults: Vec<DefaultEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleEntry>,
}

/// A registrable configuration entity, keyed by `def_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DefaultEntry {
    pub def_id: String,
    pub name: String,
}

/// A registrable loadable component, keyed by `lib_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ModuleEntry {
    pub lib_id: String,
    pub name: String,
}
