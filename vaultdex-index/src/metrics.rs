//! Scan counters and the append-only performance log

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors from the performance log
#[derive(Error, Debug)]
pub enum PerfLogError {
    /// Filesystem failure
    #[error("Performance log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The log could not be encoded
    #[error("Performance log encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One timed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfEntry {
    /// RFC 3339 timestamp of the entry
    pub ts: String,
    /// Stage name (`cache-load`, `warm-start`, `scan`)
    pub stage: String,
    /// Documents touched by the stage
    pub scanned_files: usize,
    /// Records produced or restored by the stage
    pub scanned_items: usize,
    /// Wall time of the stage
    pub duration_ms: f64,
}

impl PerfEntry {
    /// Build an entry stamped with the current time
    pub fn now(stage: &str, scanned_files: usize, scanned_items: usize, elapsed: Duration) -> Self {
        PerfEntry {
            ts: chrono::Utc::now().to_rfc3339(),
            stage: stage.to_string(),
            scanned_files,
            scanned_items,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// JSON array of [`PerfEntry`] values on disk
#[derive(Debug, Clone)]
pub struct PerfLog {
    path: PathBuf,
}

impl PerfLog {
    /// Log to the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PerfLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry; a missing file is an empty log
    pub fn entries(&self) -> Result<Vec<PerfEntry>, PerfLogError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Append one entry, starting a fresh array if the existing one is unreadable
    pub fn append(&self, entry: PerfEntry) -> Result<(), PerfLogError> {
        let mut entries = match self.entries() {
            Ok(entries) => entries,
            Err(PerfLogError::Json(err)) => {
                tracing::warn!("Discarding unreadable performance log {:?}: {}", self.path, err);
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        entries.push(entry);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

/// Parser invocation counters for one index
#[derive(Debug, Default)]
pub struct ScanMetrics {
    documents_parsed: AtomicU64,
    documents_restored: AtomicU64,
    read_failures: AtomicU64,
}

/// Point-in-time copy of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    /// Documents run through the scanner
    pub documents_parsed: u64,
    /// Documents restored from the cache without parsing
    pub documents_restored: u64,
    /// Documents that could not be read
    pub read_failures: u64,
}

impl ScanMetrics {
    pub fn record_parse(&self) {
        self.documents_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restore(&self) {
        self.documents_restored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            documents_parsed: self.documents_parsed.load(Ordering::Relaxed),
            documents_restored: self.documents_restored.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_builds_array() {
        let dir = tempfile::tempdir().unwrap();
        let log = PerfLog::new(dir.path().join("perf.json"));

        log.append(PerfEntry::now("cache-load", 0, 0, Duration::from_millis(3)))
            .unwrap();
        log.append(PerfEntry::now("scan", 1, 4, Duration::from_micros(1500)))
            .unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].stage, "scan");
        assert_eq!(entries[1].scanned_items, 4);
        assert!((entries[1].duration_ms - 1.5).abs() < 1e-9);

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(raw.contains("\"scannedFiles\""));
        assert!(raw.contains("\"durationMs\""));
    }

    #[test]
    fn test_corrupt_log_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.json");
        std::fs::write(&path, "{not json").unwrap();

        let log = PerfLog::new(&path);
        log.append(PerfEntry::now("warm-start", 2, 2, Duration::ZERO))
            .unwrap();
        assert_eq!(log.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_scan_counters() {
        let metrics = ScanMetrics::default();
        metrics.record_parse();
        metrics.record_restore();
        metrics.record_restore();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_parsed, 1);
        assert_eq!(snapshot.documents_restored, 2);
        assert_eq!(snapshot.read_failures, 0);
    }
}
