//! Shared types for vaultdex
//!
//! This crate provides common types used across the vaultdex crates,
//! including document identifiers, stat records and change-feed events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vault-relative document path, always `/`-separated
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocPath(pub String);

impl DocPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into().replace('\\', "/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the folder directly containing the document ("" at the vault root)
    pub fn parent_folder(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((dir, _)) => dir.rsplit('/').next().unwrap_or(dir),
            None => "",
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocPath {
    fn from(path: &str) -> Self {
        DocPath::new(path)
    }
}

impl From<String> for DocPath {
    fn from(path: String) -> Self {
        DocPath::new(path)
    }
}

/// File timestamps and size, in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocStat {
    pub ctime: i64,
    pub mtime: i64,
    pub size: u64,
}

impl DocStat {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            mtime: self.mtime,
            size: self.size,
        }
    }
}

/// The `{mtime, size}` pair deciding whether a document must be re-parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub mtime: i64,
    pub size: u64,
}

/// A document as listed by a document source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocHandle {
    pub path: DocPath,
    pub stat: DocStat,
}

/// A heading starting at a 0-based line of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub start_line: usize,
    pub text: String,
}

/// Document change event delivered by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocEvent {
    /// A new document appeared
    Created(DocPath),

    /// Document content changed
    Modified(DocPath),

    /// A document was removed
    Deleted(DocPath),

    /// A document moved from `from` to `to`
    Renamed { from: DocPath, to: DocPath },
}

impl DocEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DocEvent::Created(_) => "create",
            DocEvent::Modified(_) => "modify",
            DocEvent::Deleted(_) => "delete",
            DocEvent::Renamed { .. } => "rename",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_folder() {
        assert_eq!(DocPath::new("projects/home/todo.md").parent_folder(), "home");
        assert_eq!(DocPath::new("inbox/todo.md").parent_folder(), "inbox");
        assert_eq!(DocPath::new("todo.md").parent_folder(), "");
    }

    #[test]
    fn test_backslashes_normalized() {
        assert_eq!(DocPath::new(r"a\b\c.md").as_str(), "a/b/c.md");
    }
}
