//! Persistent record cache
//!
//! One JSON file holds, per document, the fingerprint it was parsed at and
//! the records it produced. A file written by a different schema version is
//! discarded whole.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use vaultdex_core::Record;
use vaultdex_types::Fingerprint;

/// Version of the cache layout understood by this build
pub const SCHEMA_VERSION: u32 = 3;

/// Errors from reading or writing the cache file
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON or unexpected shape
    #[error("Malformed cache file: {0}")]
    Json(#[from] serde_json::Error),

    /// The file was written by a different schema version
    #[error("Cache schema version {found} does not match expected {expected}")]
    SchemaMismatch {
        /// Version found in the file
        found: u64,
        /// Version this build writes
        expected: u32,
    },
}

impl CacheError {
    /// True when the cache file simply does not exist yet
    pub fn is_missing(&self) -> bool {
        matches!(self, CacheError::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Cached state of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCacheEntry {
    /// Modification time the records were parsed at (ms since epoch)
    pub mtime: i64,
    /// Size in bytes the records were parsed at
    pub size: u64,
    /// Records produced by the scan
    #[serde(default)]
    pub items: Vec<Record>,
}

impl DocumentCacheEntry {
    /// Build an entry from a fingerprint and its records
    pub fn new(fingerprint: Fingerprint, items: Vec<Record>) -> Self {
        DocumentCacheEntry {
            mtime: fingerprint.mtime,
            size: fingerprint.size,
            items,
        }
    }

    /// Fingerprint the entry was recorded at
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            mtime: self.mtime,
            size: self.size,
        }
    }
}

/// The whole cache file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFile {
    /// Layout version
    pub schema_version: u32,
    /// Entries keyed by vault-relative path
    #[serde(default)]
    pub files: BTreeMap<String, DocumentCacheEntry>,
}

impl Default for CacheFile {
    fn default() -> Self {
        CacheFile {
            schema_version: SCHEMA_VERSION,
            files: BTreeMap::new(),
        }
    }
}

impl CacheFile {
    /// Create an empty cache at the current schema version
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse cache JSON, rejecting other schema versions before touching records
    pub fn from_json(text: &str) -> Result<Self, CacheError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let found = value
            .get("schemaVersion")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if found != u64::from(SCHEMA_VERSION) {
            return Err(CacheError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Read a cache file
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Write the cache, replacing the previous file in one rename
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Look up a document's entry if its fingerprint still matches
    pub fn fresh_entry(&self, path: &str, fingerprint: Fingerprint) -> Option<&DocumentCacheEntry> {
        self.files
            .get(path)
            .filter(|entry| entry.fingerprint() == fingerprint)
    }

    /// Total number of cached records
    pub fn item_count(&self) -> usize {
        self.files.values().map(|entry| entry.items.len()).sum()
    }
}
