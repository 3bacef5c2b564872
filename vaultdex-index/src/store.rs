//! The record index
//!
//! [`Index`] owns every record of a vault, partitioned by document. Documents
//! are always re-derived from their text: a change event rescans the whole
//! document and replaces its partition, and mutations rewrite the text and
//! then rescan. Each change bumps the [`Revision`], which invalidates the
//! query memo, schedules a debounced cache write and fires a throttled change
//! notification.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use vaultdex_core::parser::task_status;
use vaultdex_core::query::run_query;
use vaultdex_core::recurrence::{mark_done, set_time_fields};
use vaultdex_core::{
    BlocksConfig, Completion, Config, DocumentInput, DocumentScanner, FilterRule, Placement,
    Record, SortRule, TaskStatus, TimeUpdate,
};
use vaultdex_types::{DocEvent, DocPath, DocStat};

use crate::cache::{CacheError, CacheFile, DocumentCacheEntry};
use crate::memo::{MemoStats, QueryMemo};
use crate::metrics::{PerfEntry, PerfLog, ScanMetrics, ScanSnapshot};
use crate::notifier::{ChangeNotifier, Listener, SubscriptionId};
use crate::revision::Revision;
use crate::timer::{Clock, SystemClock, Timer};
use crate::vault::{DocumentSource, VaultError};

/// Errors surfaced by mutation entry points
///
/// The document is never written when one of these is returned.
#[derive(Error, Debug)]
pub enum MutationError {
    /// No record with this id is indexed
    #[error("Unknown record: {0}")]
    UnknownRecord(String),

    /// The record or its current line is not a task
    #[error("Record {0} is not a task")]
    NotATask(String),

    /// The task is already done or cancelled
    #[error("Task {0} is not open")]
    NotOpenTask(String),

    /// The document no longer has the record's line
    #[error("Line {line} is out of range for {path}")]
    LineOutOfRange {
        /// Owning document
        path: DocPath,
        /// 1-based line the record points at
        line: usize,
    },

    /// Reading or writing the document failed
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Construction parameters of an [`Index`]
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOptions {
    /// Block delimiter lines
    pub blocks: BlocksConfig,
    /// Throttle window of change notifications
    pub notify_throttle: Duration,
    /// Idle time before the cache is written
    pub cache_debounce: Duration,
    /// Where completed recurring tasks get their next occurrence
    pub placement: Placement,
    /// Cache file; `None` keeps the cache in memory only
    pub cache_path: Option<PathBuf>,
    /// Performance log file
    pub perf_log: Option<PathBuf>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            blocks: BlocksConfig::default(),
            notify_throttle: Duration::from_millis(250),
            cache_debounce: Duration::from_millis(1000),
            placement: Placement::default(),
            cache_path: None,
            perf_log: None,
        }
    }
}

impl IndexOptions {
    /// Options described by a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        IndexOptions {
            blocks: config.blocks.clone(),
            notify_throttle: Duration::from_millis(config.timing.notify_throttle_ms),
            cache_debounce: Duration::from_millis(config.timing.cache_debounce_ms),
            placement: config.recurrence.placement,
            cache_path: Some(config.cache_file()),
            perf_log: config.perf_log_file(),
        }
    }
}

/// Outcome of [`Index::warm_start`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmStartReport {
    /// Documents restored from the cache
    pub restored: usize,
    /// Documents run through the scanner
    pub scanned: usize,
    /// Cache entries dropped for documents that no longer exist
    pub removed: usize,
    /// Documents that could not be read
    pub failed: usize,
    /// Records in the index afterwards
    pub items: usize,
}

/// What a call to [`Index::poll`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// A trailing change notification was delivered
    pub notified: bool,
    /// The debounced cache write ran
    pub cache_flushed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notify {
    Throttled,
    Immediate,
}

/// A document's text split into lines, remembering how to put it back
struct DocumentLines {
    lines: Vec<String>,
    newline: &'static str,
    trailing_newline: bool,
}

impl DocumentLines {
    fn parse(content: &str) -> Self {
        DocumentLines {
            lines: content.lines().map(str::to_string).collect(),
            newline: if content.contains("\r\n") { "\r\n" } else { "\n" },
            trailing_newline: content.ends_with('\n'),
        }
    }

    fn join(&self) -> String {
        let mut text = self.lines.join(self.newline);
        if self.trailing_newline {
            text.push_str(self.newline);
        }
        text
    }
}

/// The live record index over one document source
#[derive(Debug)]
pub struct Index<S: DocumentSource> {
    source: S,
    options: IndexOptions,
    scanner: DocumentScanner,
    clock: Arc<dyn Clock>,
    partitions: BTreeMap<DocPath, Vec<Record>>,
    records: Vec<Record>,
    revision: Revision,
    cache: CacheFile,
    cache_loaded: bool,
    cache_timer: Timer,
    notifier: ChangeNotifier,
    memo: QueryMemo,
    perf: Option<PerfLog>,
    metrics: ScanMetrics,
}

impl<S: DocumentSource> Index<S> {
    /// Create an empty index driven by the system clock
    pub fn new(source: S, options: IndexOptions) -> Self {
        Self::with_clock(source, options, Arc::new(SystemClock::new()))
    }

    /// Create an empty index driven by the given clock
    pub fn with_clock(source: S, options: IndexOptions, clock: Arc<dyn Clock>) -> Self {
        Index {
            scanner: DocumentScanner::new(options.blocks.clone()),
            notifier: ChangeNotifier::new(options.notify_throttle),
            perf: options.perf_log.clone().map(PerfLog::new),
            source,
            options,
            clock,
            partitions: BTreeMap::new(),
            records: Vec::new(),
            revision: Revision::ZERO,
            cache: CacheFile::new(),
            cache_loaded: false,
            cache_timer: Timer::new(),
            memo: QueryMemo::new(),
            metrics: ScanMetrics::default(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Current version counter
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Every indexed record
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of documents holding at least one record
    pub fn document_count(&self) -> usize {
        self.partitions.len()
    }

    /// Look up a record by id
    pub fn record(&self, id: &str) -> Option<&Record> {
        let (path, _) = Record::parse_id(id)?;
        self.partitions
            .get(&DocPath::new(path))?
            .iter()
            .find(|record| record.id == id)
    }

    pub fn scan_metrics(&self) -> ScanSnapshot {
        self.metrics.snapshot()
    }

    pub fn memo_stats(&self) -> MemoStats {
        self.memo.stats()
    }

    /// Build the index from the cache and the current document listing
    ///
    /// Documents whose fingerprint matches their cache entry are restored
    /// without parsing; the rest are scanned. The revision moves exactly once.
    pub fn warm_start(&mut self) -> Result<WarmStartReport, VaultError> {
        let started = Instant::now();
        let cache = if self.cache_loaded {
            std::mem::take(&mut self.cache)
        } else {
            self.load_cache()
        };
        self.cache_loaded = true;

        let docs = match self.source.list_documents() {
            Ok(docs) => docs,
            Err(err) => {
                self.cache = cache;
                return Err(err);
            }
        };

        let mut report = WarmStartReport::default();
        let mut partitions = BTreeMap::new();
        let mut fresh = CacheFile::new();
        let present: HashSet<&str> = docs.iter().map(|doc| doc.path.as_str()).collect();
        report.removed = cache
            .files
            .keys()
            .filter(|path| !present.contains(path.as_str()))
            .count();

        for doc in &docs {
            let fingerprint = doc.stat.fingerprint();
            let key = doc.path.as_str();

            let records = match cache.fresh_entry(key, fingerprint) {
                Some(entry) => {
                    self.metrics.record_restore();
                    report.restored += 1;
                    entry.items.clone()
                }
                _ => match self.scan_document(&doc.path, doc.stat) {
                    Some(records) => {
                        report.scanned += 1;
                        records
                    }
                    None => {
                        report.failed += 1;
                        continue;
                    }
                },
            };

            fresh.files.insert(
                key.to_string(),
                DocumentCacheEntry::new(fingerprint, records.clone()),
            );
            if !records.is_empty() {
                partitions.insert(doc.path.clone(), records);
            }
        }

        self.records = partitions.values().flatten().cloned().collect();
        self.partitions = partitions;
        self.cache = fresh;
        report.items = self.records.len();

        tracing::info!(
            "Warm start: {} restored, {} scanned, {} removed, {} failed, {} records",
            report.restored,
            report.scanned,
            report.removed,
            report.failed,
            report.items
        );
        self.log_perf("warm-start", docs.len(), report.items, started.elapsed());

        self.commit(Notify::Throttled);
        Ok(report)
    }

    /// Rescan one document and replace its records
    ///
    /// Returns the number of records the document now has. A document that
    /// cannot be read ends up with none.
    pub fn scan_file(&mut self, path: &DocPath) -> usize {
        self.rescan(path, Notify::Throttled)
    }

    /// Drop every record of a document
    pub fn remove_file_items(&mut self, path: &DocPath) -> usize {
        let removed = self.replace_partition(path, Vec::new());
        self.cache.files.remove(path.as_str());
        tracing::debug!("Removed {} record(s) of {}", removed, path);
        self.commit(Notify::Throttled);
        removed
    }

    /// Apply one change-feed event
    pub fn apply_event(&mut self, event: &DocEvent) {
        tracing::debug!("Applying {} event", event.kind());
        match event {
            DocEvent::Created(path) | DocEvent::Modified(path) => {
                self.scan_file(path);
            }
            DocEvent::Deleted(path) => {
                self.remove_file_items(path);
            }
            DocEvent::Renamed { from, to } => {
                self.remove_file_items(from);
                self.scan_file(to);
            }
        }
    }

    /// Filter and sort the records, memoized per revision
    pub fn query_items(&self, filters: &[FilterRule], sort: &[SortRule]) -> Arc<Vec<Record>> {
        self.memo.get_or_compute(self.revision, filters, sort, || {
            run_query(&self.records, filters, sort)
        })
    }

    /// Register a change listener
    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.notifier.subscribe(listener)
    }

    /// Remove a change listener
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Throttled notification of the current revision
    pub fn notify_change(&mut self) -> bool {
        let now = self.clock.now();
        self.notifier.notify_change(now, self.revision)
    }

    /// Unthrottled notification of the current revision
    pub fn notify_now(&mut self) {
        let now = self.clock.now();
        self.notifier.notify_now(now, self.revision);
    }

    /// Run whatever timers are due
    pub fn poll(&mut self) -> PollOutcome {
        let now = self.clock.now();
        let mut outcome = PollOutcome {
            notified: self.notifier.poll(now),
            cache_flushed: false,
        };
        if self.cache_timer.fire_if_due(now) {
            match self.write_cache() {
                Ok(written) => outcome.cache_flushed = written,
                Err(err) => tracing::warn!("Failed to write cache: {}", err),
            }
        }
        outcome
    }

    /// Earliest pending timer deadline, as a clock offset
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.notifier.next_deadline(), self.cache_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Time left until the earliest pending deadline
    pub fn time_until_deadline(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.next_deadline()
            .map(|deadline| deadline.saturating_sub(now))
    }

    /// Write the cache now, cancelling any pending debounced write
    ///
    /// Returns false when the index has no cache file.
    pub fn flush_cache(&mut self) -> Result<bool, CacheError> {
        self.cache_timer.cancel();
        self.write_cache()
    }

    /// Complete a task using the local date and time
    pub fn complete_task(&mut self, id: &str) -> Result<Completion, MutationError> {
        let now = chrono::Local::now();
        self.complete_task_at(id, now.date_naive(), now.time())
    }

    /// Complete an open task as of `today` at `now`
    ///
    /// A recurring task also gets its next occurrence written next to it.
    pub fn complete_task_at(
        &mut self,
        id: &str,
        today: NaiveDate,
        now: NaiveTime,
    ) -> Result<Completion, MutationError> {
        let (path, idx, mut doc) = self.locate_task(id)?;

        let raw = &doc.lines[idx];
        match task_status(raw) {
            Some(TaskStatus::Open) => {}
            Some(_) => return Err(MutationError::NotOpenTask(id.to_string())),
            None => return Err(MutationError::NotATask(id.to_string())),
        }

        let completion = mark_done(raw, today, now);
        doc.lines[idx] = completion.done_line.clone();
        if let Some(next) = &completion.next_line {
            let at = match self.options.placement {
                Placement::Above => idx,
                Placement::Below => idx + 1,
            };
            doc.lines.insert(at, next.clone());
        }

        self.source.write(&path, &doc.join())?;
        tracing::info!("Completed {}", id);
        self.rescan(&path, Notify::Immediate);
        Ok(completion)
    }

    /// Set the time tokens of a task; absent fields are left untouched
    pub fn update_task_time(&mut self, id: &str, update: &TimeUpdate) -> Result<(), MutationError> {
        let (path, idx, mut doc) = self.locate_task(id)?;

        let raw = &doc.lines[idx];
        if task_status(raw).is_none() {
            return Err(MutationError::NotATask(id.to_string()));
        }
        if update.is_empty() {
            return Ok(());
        }

        let rewritten = set_time_fields(raw, update);
        if rewritten == *raw {
            return Ok(());
        }
        doc.lines[idx] = rewritten;

        self.source.write(&path, &doc.join())?;
        tracing::info!("Updated time of {}", id);
        self.rescan(&path, Notify::Immediate);
        Ok(())
    }

    /// Resolve a task id to its document and current 0-based line
    fn locate_task(&self, id: &str) -> Result<(DocPath, usize, DocumentLines), MutationError> {
        let record = self
            .record(id)
            .ok_or_else(|| MutationError::UnknownRecord(id.to_string()))?;
        if !record.is_task() {
            return Err(MutationError::NotATask(id.to_string()));
        }

        let path = DocPath::new(record.path.as_str());
        let line = record.line;
        let content = self.source.read(&path)?;
        let doc = DocumentLines::parse(&content);
        if line == 0 || line > doc.lines.len() {
            return Err(MutationError::LineOutOfRange { path, line });
        }
        Ok((path, line - 1, doc))
    }

    fn rescan(&mut self, path: &DocPath, notify: Notify) -> usize {
        let started = Instant::now();
        let scanned = match self.source.stat(path) {
            Ok(stat) => self.scan_document(path, stat).map(|records| (stat, records)),
            Err(err) => {
                tracing::warn!("Failed to stat {}: {}", path, err);
                None
            }
        };

        let count = match scanned {
            Some((stat, records)) => {
                self.cache.files.insert(
                    path.as_str().to_string(),
                    DocumentCacheEntry::new(stat.fingerprint(), records.clone()),
                );
                let count = records.len();
                self.replace_partition(path, records);
                count
            }
            None => {
                self.cache.files.remove(path.as_str());
                self.replace_partition(path, Vec::new());
                0
            }
        };

        self.log_perf("scan", 1, count, started.elapsed());
        self.commit(notify);
        count
    }

    /// Parse a document; `None` when its text could not be read
    fn scan_document(&self, path: &DocPath, stat: DocStat) -> Option<Vec<Record>> {
        let content = match self.source.read(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read {}: {}", path, err);
                self.metrics.record_read_failure();
                return None;
            }
        };
        let headings = self.source.headings(path, &content);
        self.metrics.record_parse();
        Some(self.scanner.scan(DocumentInput {
            path,
            content: &content,
            stat,
            headings: &headings,
        }))
    }

    /// Swap a document's partition, returning how many records it held before
    ///
    /// The flat list is rebuilt from the partitions so it stays in path then
    /// line order regardless of edit history.
    fn replace_partition(&mut self, path: &DocPath, records: Vec<Record>) -> usize {
        let previous = self.partitions.remove(path).map_or(0, |old| old.len());
        if !records.is_empty() {
            self.partitions.insert(path.clone(), records);
        }
        self.records = self.partitions.values().flatten().cloned().collect();
        previous
    }

    /// Bump the revision, schedule the cache write and notify
    fn commit(&mut self, notify: Notify) {
        self.revision = self.revision.next();
        let now = self.clock.now();
        if self.options.cache_path.is_some() {
            self.cache_timer.schedule_after(now, self.options.cache_debounce);
        }
        match notify {
            Notify::Throttled => {
                self.notifier.notify_change(now, self.revision);
            }
            Notify::Immediate => self.notifier.notify_now(now, self.revision),
        }
    }

    fn load_cache(&self) -> CacheFile {
        let Some(path) = &self.options.cache_path else {
            return CacheFile::new();
        };
        let started = Instant::now();
        let cache = match CacheFile::load(path) {
            Ok(cache) => cache,
            Err(err) if err.is_missing() => {
                tracing::debug!("No cache at {:?}", path);
                CacheFile::new()
            }
            Err(CacheError::SchemaMismatch { found, expected }) => {
                tracing::info!(
                    "Discarding cache with schema {} (expected {})",
                    found,
                    expected
                );
                CacheFile::new()
            }
            Err(err) => {
                tracing::warn!("Ignoring unreadable cache {:?}: {}", path, err);
                CacheFile::new()
            }
        };
        self.log_perf(
            "cache-load",
            cache.files.len(),
            cache.item_count(),
            started.elapsed(),
        );
        cache
    }

    fn write_cache(&self) -> Result<bool, CacheError> {
        let Some(path) = &self.options.cache_path else {
            return Ok(false);
        };
        self.cache.save(path)?;
        tracing::debug!("Wrote cache with {} document(s) to {:?}", self.cache.files.len(), path);
        Ok(true)
    }

    fn log_perf(&self, stage: &str, files: usize, items: usize, elapsed: Duration) {
        if let Some(perf) = &self.perf {
            if let Err(err) = perf.append(PerfEntry::now(stage, files, items, elapsed)) {
                tracing::warn!("Failed to append to performance log: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;
    use crate::vault::MemoryVault;

    fn index_over(vault: MemoryVault) -> (Index<MemoryVault>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let index = Index::with_clock(vault, IndexOptions::default(), clock.clone());
        (index, clock)
    }

    #[test]
    fn test_document_lines_preserve_endings() {
        let doc = DocumentLines::parse("a\r\nb\r\n");
        assert_eq!(doc.lines, vec!["a", "b"]);
        assert_eq!(doc.join(), "a\r\nb\r\n");

        let doc = DocumentLines::parse("a\nb");
        assert_eq!(doc.join(), "a\nb");
    }

    #[test]
    fn test_scan_and_remove() {
        let vault = MemoryVault::new();
        vault.insert("a.md", "- [ ] one\n- [x] two\n");
        vault.insert("b.md", "- [ ] three\n");
        let (mut index, _) = index_over(vault);

        index.warm_start().unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.revision(), Revision(1));

        index.source().insert("a.md", "- [ ] one\n");
        assert_eq!(index.scan_file(&DocPath::new("a.md")), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.revision(), Revision(2));

        assert_eq!(index.remove_file_items(&DocPath::new("b.md")), 1);
        assert_eq!(index.len(), 1);
        assert_eq!(index.document_count(), 1);
        assert!(index.record("b.md:1").is_none());
        assert!(index.record("a.md:1").is_some());
    }

    #[test]
    fn test_rescan_keeps_document_order() {
        let vault = MemoryVault::new();
        vault.insert("a.md", "- [ ] a1\n");
        vault.insert("b.md", "- [ ] b1\n");
        vault.insert("c.md", "- [ ] c1\n");
        let (mut index, _) = index_over(vault);
        index.warm_start().unwrap();

        index.source().insert("a.md", "- [ ] a1\n- [ ] a2\n");
        index.scan_file(&DocPath::new("a.md"));

        let ids: Vec<&str> = index.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a.md:1", "a.md:2", "b.md:1", "c.md:1"]);
        let unsorted = index.query_items(&[], &[]);
        assert_eq!(unsorted[0].id, "a.md:1");
        assert_eq!(unsorted[3].id, "c.md:1");
    }

    #[test]
    fn test_rename_moves_records() {
        let vault = MemoryVault::new();
        vault.insert("old/a.md", "- [ ] move me\n");
        let (mut index, _) = index_over(vault);
        index.warm_start().unwrap();

        let from = DocPath::new("old/a.md");
        index.source().rename(&from, "new/a.md");
        index.apply_event(&DocEvent::Renamed {
            from,
            to: DocPath::new("new/a.md"),
        });

        assert_eq!(index.len(), 1);
        let record = index.record("new/a.md:1").unwrap();
        assert_eq!(record.category, "new");
    }

    #[test]
    fn test_next_deadline_is_earliest_timer() {
        let vault = MemoryVault::new();
        vault.insert("a.md", "- [ ] one\n");
        let clock = Arc::new(ManualClock::new());
        let options = IndexOptions {
            cache_path: Some(PathBuf::from("unused.json")),
            ..IndexOptions::default()
        };
        let mut index = Index::with_clock(vault, options, clock.clone());

        index.warm_start().unwrap();
        clock.advance(Duration::from_millis(10));
        index.scan_file(&DocPath::new("a.md"));

        assert_eq!(index.next_deadline(), Some(Duration::from_millis(250)));
        assert_eq!(
            index.time_until_deadline(),
            Some(Duration::from_millis(240))
        );
    }
}
