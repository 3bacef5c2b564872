//! Document sources
//!
//! The index reads documents through [`DocumentSource`]. [`FsVault`] serves a
//! directory tree; [`MemoryVault`] keeps documents in memory for embedding
//! hosts and tests.

use dashmap::{DashMap, DashSet};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use vaultdex_core::{extract_headings, Config};
use vaultdex_types::{DocHandle, DocPath, DocStat, Heading};
use walkdir::WalkDir;

/// Errors raised by a document source
#[derive(Error, Debug)]
pub enum VaultError {
    /// No document at this path
    #[error("Document not found: {0}")]
    NotFound(DocPath),

    /// Reading or writing a document failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Document being accessed
        path: DocPath,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Listing the vault failed
    #[error("Failed to walk vault: {0}")]
    Walk(#[from] walkdir::Error),
}

impl VaultError {
    fn io(path: &DocPath, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            VaultError::NotFound(path.clone())
        } else {
            VaultError::Io {
                path: path.clone(),
                source,
            }
        }
    }
}

/// Where the index gets document listings, content and headings from
pub trait DocumentSource {
    /// Every document currently in the vault
    fn list_documents(&self) -> Result<Vec<DocHandle>, VaultError>;

    /// Timestamps and size of one document
    fn stat(&self, path: &DocPath) -> Result<DocStat, VaultError>;

    /// Full text of one document
    fn read(&self, path: &DocPath) -> Result<String, VaultError>;

    /// Replace the text of one document
    fn write(&self, path: &DocPath, content: &str) -> Result<(), VaultError>;

    /// Headings of a document; the default parses the markdown itself
    fn headings(&self, _path: &DocPath, content: &str) -> Vec<Heading> {
        extract_headings(content)
    }
}

impl<S: DocumentSource + ?Sized> DocumentSource for &S {
    fn list_documents(&self) -> Result<Vec<DocHandle>, VaultError> {
        (**self).list_documents()
    }

    fn stat(&self, path: &DocPath) -> Result<DocStat, VaultError> {
        (**self).stat(path)
    }

    fn read(&self, path: &DocPath) -> Result<String, VaultError> {
        (**self).read(path)
    }

    fn write(&self, path: &DocPath, content: &str) -> Result<(), VaultError> {
        (**self).write(path, content)
    }

    fn headings(&self, path: &DocPath, content: &str) -> Vec<Heading> {
        (**self).headings(path, content)
    }
}

/// A directory of markdown files
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
    extensions: Vec<String>,
    ignore_patterns: Vec<Regex>,
}

impl FsVault {
    /// Serve `.md` files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsVault {
            root: root.into(),
            extensions: vec!["md".to_string()],
            ignore_patterns: Vec::new(),
        }
    }

    /// Vault described by a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        FsVault {
            root: config.vault_dir(),
            extensions: config.extensions.clone(),
            ignore_patterns: compile_ignore_patterns(&config.ignore_patterns),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Vault-relative path of an absolute path, if it names a served document
    pub fn relative_path(&self, path: &Path) -> Option<DocPath> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let doc = DocPath::new(rel.to_string_lossy().into_owned());
        self.accepts(&doc).then_some(doc)
    }

    /// Whether a vault-relative path is served: right extension, no hidden
    /// component, not matched by an ignore pattern
    pub fn accepts(&self, path: &DocPath) -> bool {
        let rel = path.as_str();
        if rel.split('/').any(|part| part.starts_with('.')) {
            return false;
        }
        let has_ext = Path::new(rel)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
            });
        if !has_ext {
            return false;
        }
        if self.ignore_patterns.iter().any(|re| re.is_match(rel)) {
            tracing::debug!("Ignoring {} due to ignore_patterns", rel);
            return false;
        }
        true
    }

    fn absolute(&self, path: &DocPath) -> PathBuf {
        self.root.join(path.as_str())
    }
}

fn compile_ignore_patterns(patterns: &[String]) -> Vec<Regex> {
    let mut compiled = Vec::new();
    for pat in patterns {
        match Regex::new(pat) {
            Ok(re) => compiled.push(re),
            Err(err) => tracing::warn!("Invalid ignore pattern '{}': {}", pat, err),
        }
    }
    compiled
}

fn millis(time: std::io::Result<std::time::SystemTime>) -> Option<i64> {
    let time = time.ok()?;
    let since = time.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since.as_millis()).ok()
}

fn stat_of(metadata: &std::fs::Metadata) -> DocStat {
    let mtime = millis(metadata.modified()).unwrap_or(0);
    DocStat {
        ctime: millis(metadata.created()).unwrap_or(mtime),
        mtime,
        size: metadata.len(),
    }
}

impl DocumentSource for FsVault {
    fn list_documents(&self) -> Result<Vec<DocHandle>, VaultError> {
        let mut docs = Vec::new();
        let walker = WalkDir::new(&self.root).into_iter().filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = self.relative_path(entry.path()) else {
                continue;
            };
            match entry.metadata() {
                Ok(metadata) => docs.push(DocHandle {
                    path,
                    stat: stat_of(&metadata),
                }),
                Err(err) => tracing::warn!("Failed to stat {}: {}", path, err),
            }
        }

        docs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(docs)
    }

    fn stat(&self, path: &DocPath) -> Result<DocStat, VaultError> {
        let metadata =
            std::fs::metadata(self.absolute(path)).map_err(|err| VaultError::io(path, err))?;
        Ok(stat_of(&metadata))
    }

    fn read(&self, path: &DocPath) -> Result<String, VaultError> {
        std::fs::read_to_string(self.absolute(path)).map_err(|err| VaultError::io(path, err))
    }

    fn write(&self, path: &DocPath, content: &str) -> Result<(), VaultError> {
        std::fs::write(self.absolute(path), content).map_err(|err| VaultError::io(path, err))
    }
}

#[derive(Debug, Clone)]
struct MemoryDoc {
    content: String,
    stat: DocStat,
}

/// In-memory vault
///
/// Every write advances a logical clock used as the document's mtime, so
/// fingerprints change whenever content does.
#[derive(Debug, Default)]
pub struct MemoryVault {
    docs: DashMap<DocPath, MemoryDoc>,
    unreadable: DashSet<DocPath>,
    tick: AtomicI64,
}

impl MemoryVault {
    /// Create an empty vault
    pub fn new() -> Self {
        Self::default()
    }

    fn next_tick(&self) -> i64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Create or replace a document
    pub fn insert(&self, path: impl Into<DocPath>, content: impl Into<String>) {
        let path = path.into();
        let content = content.into();
        let now = self.next_tick();
        let ctime = self.docs.get(&path).map_or(now, |doc| doc.stat.ctime);
        let stat = DocStat {
            ctime,
            mtime: now,
            size: content.len() as u64,
        };
        self.docs.insert(path, MemoryDoc { content, stat });
    }

    /// Delete a document; returns true if it existed
    pub fn remove(&self, path: &DocPath) -> bool {
        self.docs.remove(path).is_some()
    }

    /// Move a document, keeping its content and timestamps
    pub fn rename(&self, from: &DocPath, to: impl Into<DocPath>) -> bool {
        match self.docs.remove(from) {
            Some((_, doc)) => {
                self.docs.insert(to.into(), doc);
                true
            }
            None => false,
        }
    }

    /// Current content of a document
    pub fn content(&self, path: &DocPath) -> Option<String> {
        self.docs.get(path).map(|doc| doc.content.clone())
    }

    /// Make reads of a document fail, to simulate I/O errors
    pub fn set_unreadable(&self, path: impl Into<DocPath>, unreadable: bool) {
        let path = path.into();
        if unreadable {
            self.unreadable.insert(path);
        } else {
            self.unreadable.remove(&path);
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl DocumentSource for MemoryVault {
    fn list_documents(&self) -> Result<Vec<DocHandle>, VaultError> {
        let mut docs: Vec<DocHandle> = self
            .docs
            .iter()
            .map(|entry| DocHandle {
                path: entry.key().clone(),
                stat: entry.value().stat,
            })
            .collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(docs)
    }

    fn stat(&self, path: &DocPath) -> Result<DocStat, VaultError> {
        self.docs
            .get(path)
            .map(|doc| doc.stat)
            .ok_or_else(|| VaultError::NotFound(path.clone()))
    }

    fn read(&self, path: &DocPath) -> Result<String, VaultError> {
        if self.unreadable.contains(path) {
            return Err(VaultError::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "unreadable"),
            });
        }
        self.content(path)
            .ok_or_else(|| VaultError::NotFound(path.clone()))
    }

    fn write(&self, path: &DocPath, content: &str) -> Result<(), VaultError> {
        if !self.docs.contains_key(path) {
            return Err(VaultError::NotFound(path.clone()));
        }
        self.insert(path.clone(), content);
        Ok(())
    }
}
