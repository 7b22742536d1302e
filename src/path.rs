//! Hierarchical scene paths.
//!
//! [`ScenePath`] is the key type used by every table in the engine: an
//! absolute, slash-delimited path into the composed scene description
//! (`/root/rig/body`). It is a small value type — cloneable, totally
//! ordered, hashable — so it can key maps and sort deterministically.

use std::fmt;

use crate::errors::{Result, StageLinkError};

/// An absolute hierarchical path into the scene description.
///
/// Paths are always absolute (they start with `/`), never carry a
/// trailing slash, and segments are non-empty. The root path is `/`.
///
/// Ordering is lexicographic over the underlying string, which keeps
/// parents sorted before their descendants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScenePath(String);

impl ScenePath {
    /// Returns the root path `/`.
    #[must_use]
    pub fn root() -> Self {
        ScenePath("/".to_string())
    }

    /// Parses an absolute path string.
    ///
    /// Rejects relative paths, empty segments and trailing slashes
    /// (except the root itself).
    pub fn new(path: &str) -> Result<Self> {
        if path == "/" {
            return Ok(Self::root());
        }
        if !path.starts_with('/') || path.ends_with('/') {
            return Err(StageLinkError::InvalidPath(path.to_string()));
        }
        if path[1..].split('/').any(str::is_empty) {
            return Err(StageLinkError::InvalidPath(path.to_string()));
        }
        Ok(ScenePath(path.to_string()))
    }

    /// True for the root path `/`.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Returns the parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<ScenePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(ScenePath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Returns the last path segment (the prim name), empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        if self.is_root() {
            return "";
        }
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Appends a single segment, returning the child path.
    #[must_use]
    pub fn append(&self, segment: &str) -> ScenePath {
        if self.is_root() {
            ScenePath(format!("/{segment}"))
        } else {
            ScenePath(format!("{}/{segment}", self.0))
        }
    }

    /// True if `self` equals `prefix` or lies beneath it.
    ///
    /// Prefix matching is segment-aware: `/ab` is not under `/a`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &ScenePath) -> bool {
        if prefix.is_root() || self == prefix {
            return true;
        }
        self.0.len() > prefix.0.len()
            && self.0.starts_with(&prefix.0)
            && self.0.as_bytes()[prefix.0.len()] == b'/'
    }

    /// Iterates the path segments from the root down.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// All ancestor paths from just below the root down to `self`
    /// inclusive. Empty for the root path.
    #[must_use]
    pub fn chain(&self) -> Vec<ScenePath> {
        let mut out = Vec::new();
        let mut current = Self::root();
        for segment in self.segments() {
            current = current.append(segment);
            out.push(current.clone());
        }
        out
    }

    /// The underlying path string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
