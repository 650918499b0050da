//! Path guard for change-set file references.
//!
//! Every file named by a change-set is resolved through [`resolve_under`]
//! before any create or delete touches the filesystem. A reference that
//! escapes the install root aborts the entire version step; this is treated
//! as a security problem, not an ordinary I/O error.

use std::path::{Path, PathBuf};

use crate::runtime::path::{is_path_under, normalize_path};

/// A change-set file reference resolved outside the install root.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEscape {
    /// The offending file reference as written in the manifest.
    pub file: String,
    /// Where it would have landed after normalization.
    pub resolved: PathBuf,
}

impl std::fmt::Display for PathEscape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "file reference '{}' escapes the install root (resolves to {})",
            self.file,
            self.resolved.display()
        )
    }
}

impl std::error::Error for PathEscape {}

/// Resolve `relative` against `root` and require the result to stay under `root`.
///
/// Resolution is lexical: `.` and `..` components are folded without touching
/// the filesystem, then the normalized result must still have the normalized
/// root as a component-wise prefix.
pub fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf, PathEscape> {
    let resolved = normalize_path(&root.join(relative));
    if is_path_under(&resolved, root) {
        Ok(resolved)
    } else {
        Err(PathEscape {
            file: relative.to_string(),
            resolved,
        })
    }
}
