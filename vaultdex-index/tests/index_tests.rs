//! Integration tests for the record index

use chrono::{NaiveDate, NaiveTime};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vaultdex_core::{Config, FilterRule, Operator, Placement, SortRule, TaskStatus, TimeUpdate};
use vaultdex_index::{
    CacheFile, ChangeNotice, DocEvent, DocPath, FsVault, Index, IndexOptions, ManualClock,
    MemoryVault, MutationError, PerfLog, Revision, SCHEMA_VERSION,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap()
}

fn memory_index(vault: MemoryVault) -> (Index<MemoryVault>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let index = Index::with_clock(vault, IndexOptions::default(), clock.clone());
    (index, clock)
}

fn record_notices<S: vaultdex_index::DocumentSource>(
    index: &mut Index<S>,
) -> Arc<Mutex<Vec<ChangeNotice>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    index.subscribe(Box::new(move |notice| sink.lock().push(*notice)));
    seen
}

fn fs_vault(root: &Path) -> (Config, IndexOptions) {
    std::fs::write(
        root.join("work.md"),
        "# Work #job\n- [ ] Ship release 📅 2024-05-01\n- [x] Write notes ✅ 2024-04-30\n",
    )
    .unwrap();
    std::fs::create_dir_all(root.join("journal")).unwrap();
    std::fs::write(
        root.join("journal/may.md"),
        "```record\ndate:: 2024-05-02\nmood:: good\nLong walk by the river.\n```\n",
    )
    .unwrap();

    let mut config = Config::default();
    config.vault = root.to_path_buf();
    config.perf_log = Some(root.join(".vaultdex/perf.json"));
    let options = IndexOptions::from_config(&config);
    (config, options)
}

#[test]
fn test_warm_start_twice_parses_nothing_the_second_time() {
    let dir = tempfile::tempdir().unwrap();
    let (config, options) = fs_vault(dir.path());

    let mut first = Index::new(FsVault::from_config(&config), options.clone());
    let report = first.warm_start().unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.restored, 0);
    assert_eq!(report.items, 3);

    let again = first.warm_start().unwrap();
    assert_eq!(again.scanned, 0);
    assert_eq!(again.restored, 2);
    assert_eq!(first.scan_metrics().documents_parsed, 2);
    assert!(first.flush_cache().unwrap());

    let mut second = Index::new(FsVault::from_config(&config), options);
    let report = second.warm_start().unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(report.restored, 2);
    assert_eq!(second.scan_metrics().documents_parsed, 0);
    assert_eq!(second.records(), first.records());
}

#[test]
fn test_changed_and_deleted_documents_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (config, options) = fs_vault(dir.path());

    let mut first = Index::new(FsVault::from_config(&config), options.clone());
    first.warm_start().unwrap();
    first.flush_cache().unwrap();

    std::fs::write(
        dir.path().join("work.md"),
        "- [ ] Ship release 📅 2024-05-01\n- [ ] Tag the build\n- [ ] Announce\n",
    )
    .unwrap();
    std::fs::remove_file(dir.path().join("journal/may.md")).unwrap();

    let mut second = Index::new(FsVault::from_config(&config), options);
    let report = second.warm_start().unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.restored, 0);
    assert_eq!(report.removed, 1);
    assert_eq!(report.items, 3);
}

#[test]
fn test_schema_mismatch_rescans_everything() {
    let dir = tempfile::tempdir().unwrap();
    let (config, options) = fs_vault(dir.path());

    let mut first = Index::new(FsVault::from_config(&config), options.clone());
    first.warm_start().unwrap();
    first.flush_cache().unwrap();

    let cache_path = config.cache_file();
    let mut json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
    json["schemaVersion"] = serde_json::json!(SCHEMA_VERSION - 1);
    std::fs::write(&cache_path, json.to_string()).unwrap();

    let mut second = Index::new(FsVault::from_config(&config), options);
    let report = second.warm_start().unwrap();
    assert_eq!(report.restored, 0);
    assert_eq!(report.scanned, 2);

    second.flush_cache().unwrap();
    assert_eq!(CacheFile::load(&cache_path).unwrap().schema_version, SCHEMA_VERSION);
}

#[test]
fn test_perf_log_records_stages() {
    let dir = tempfile::tempdir().unwrap();
    let (config, options) = fs_vault(dir.path());

    let mut index = Index::new(FsVault::from_config(&config), options);
    index.warm_start().unwrap();
    index.scan_file(&DocPath::new("work.md"));

    let entries = PerfLog::new(config.perf_log_file().unwrap()).entries().unwrap();
    let stages: Vec<&str> = entries.iter().map(|e| e.stage.as_str()).collect();
    assert_eq!(stages, vec!["cache-load", "warm-start", "scan"]);
    assert_eq!(entries[1].scanned_files, 2);
    assert_eq!(entries[1].scanned_items, 3);
    assert_eq!(entries[2].scanned_items, 2);
}

#[test]
fn test_filter_and_sort() {
    let vault = MemoryVault::new();
    vault.insert(
        "tasks.md",
        "- [ ] b task 📅 2024-02-02\n- [x] done one ✅ 2024-01-05\n- [ ] A task 📅 2024-01-01\n- [x] done two ✅ 2024-01-04\n",
    );
    let (mut index, _) = memory_index(vault);
    index.warm_start().unwrap();

    let done = index.query_items(&[FilterRule::new("status", Operator::Eq, "done")], &[]);
    assert_eq!(done.len(), 2);
    assert!(done.iter().all(|r| r.status.as_deref() == Some("done")));

    let by_date = index.query_items(&[], &[SortRule::asc("date")]);
    let titles: Vec<&str> = by_date.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["A task", "done two", "done one", "b task"]);

    let again = index.query_items(&[FilterRule::new("status", Operator::Eq, "done")], &[]);
    assert!(Arc::ptr_eq(&done, &again));
    assert_eq!(index.memo_stats().hits, 1);

    index.scan_file(&DocPath::new("tasks.md"));
    let fresh = index.query_items(&[FilterRule::new("status", Operator::Eq, "done")], &[]);
    assert!(!Arc::ptr_eq(&done, &fresh));
    assert_eq!(*done, *fresh);
}

#[test]
fn test_complete_recurring_task() {
    let vault = MemoryVault::new();
    vault.insert(
        "habits.md",
        "# Habits\n- [ ] Stretch 🔁 every week 📅 2024-03-01\n",
    );
    let (mut index, _) = memory_index(vault);
    index.warm_start().unwrap();
    let seen = record_notices(&mut index);

    let completion = index
        .complete_task_at("habits.md:2", date("2024-03-08"), time("07:30"))
        .unwrap();
    assert!(completion.done_line.contains("✅ 2024-03-08"));
    assert_eq!(
        completion.next_line.as_deref(),
        Some("- [ ] Stretch 🔁 every week 📅 2024-03-08")
    );

    let content = index.source().content(&DocPath::new("habits.md")).unwrap();
    assert_eq!(
        content,
        "# Habits\n\
         - [ ] Stretch 🔁 every week 📅 2024-03-08\n\
         - [x] Stretch (time::07:30) 🔁 every week 📅 2024-03-01 ✅ 2024-03-08\n"
    );

    let next = index.record("habits.md:2").unwrap();
    assert_eq!(next.task_status(), Some(TaskStatus::Open));
    assert_eq!(next.dates.due.as_deref(), Some("2024-03-08"));
    assert_eq!(next.header.as_deref(), Some("Habits"));
    let done = index.record("habits.md:3").unwrap();
    assert_eq!(done.task_status(), Some(TaskStatus::Done));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].immediate);
    assert_eq!(seen[0].revision, index.revision());
}

#[test]
fn test_next_occurrence_below() {
    let vault = MemoryVault::new();
    vault.insert("h.md", "- [ ] Review 🔁 every month 📅 2024-01-31\n");
    let clock = Arc::new(ManualClock::new());
    let options = IndexOptions {
        placement: Placement::Below,
        ..IndexOptions::default()
    };
    let mut index = Index::with_clock(vault, options, clock);
    index.warm_start().unwrap();

    index
        .complete_task_at("h.md:1", date("2024-02-01"), time("09:00"))
        .unwrap();
    let content = index.source().content(&DocPath::new("h.md")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines[0].starts_with("- [x] Review"));
    assert_eq!(lines[1], "- [ ] Review 🔁 every month 📅 2024-02-29");
}

#[test]
fn test_failed_mutations_leave_document_untouched() {
    let vault = MemoryVault::new();
    let original = "- [x] Already done ✅ 2024-01-01\n```record\nnote body\n```\n- [ ] Open\n";
    vault.insert("m.md", original);
    let (mut index, _) = memory_index(vault);
    index.warm_start().unwrap();
    let revision = index.revision();

    assert!(matches!(
        index.complete_task_at("m.md:1", date("2024-02-01"), time("10:00")),
        Err(MutationError::NotOpenTask(_))
    ));
    assert!(matches!(
        index.complete_task_at("m.md:2", date("2024-02-01"), time("10:00")),
        Err(MutationError::NotATask(_))
    ));
    assert!(matches!(
        index.complete_task_at("m.md:99", date("2024-02-01"), time("10:00")),
        Err(MutationError::UnknownRecord(_))
    ));

    index.source().insert("m.md", "- [x] Already done ✅ 2024-01-01\n");
    assert!(matches!(
        index.complete_task_at("m.md:5", date("2024-02-01"), time("10:00")),
        Err(MutationError::LineOutOfRange { line: 5, .. })
    ));

    assert_eq!(index.revision(), revision);
    assert_eq!(
        index.source().content(&DocPath::new("m.md")).unwrap(),
        "- [x] Already done ✅ 2024-01-01\n"
    );
}

#[test]
fn test_update_task_time() {
    let vault = MemoryVault::new();
    vault.insert("day.md", "- [ ] Gym duration::1h 🔁 every day\n");
    let (mut index, _) = memory_index(vault);
    index.warm_start().unwrap();

    index
        .update_task_time(
            "day.md:1",
            &TimeUpdate {
                time: Some("18:00".into()),
                end_time: None,
                duration: Some("90m".into()),
            },
        )
        .unwrap();

    let record = index.record("day.md:1").unwrap();
    assert_eq!(record.extra.get("time").map(|v| v.to_string()).as_deref(), Some("18:00"));
    assert_eq!(record.extra.get("duration").map(|v| v.to_string()).as_deref(), Some("90m"));
    assert!(record.extra.get("endTime").is_none());

    let revision = index.revision();
    index.update_task_time("day.md:1", &TimeUpdate::default()).unwrap();
    assert_eq!(index.revision(), revision);
}

#[test]
fn test_notifications_are_throttled() {
    let vault = MemoryVault::new();
    vault.insert("a.md", "- [ ] one\n");
    let (mut index, clock) = memory_index(vault);
    let seen = record_notices(&mut index);

    index.warm_start().unwrap();
    assert_eq!(seen.lock().len(), 1);

    let path = DocPath::new("a.md");
    clock.advance(ms(10));
    index.scan_file(&path);
    clock.advance(ms(10));
    index.scan_file(&path);
    clock.advance(ms(80));
    assert!(!index.poll().notified);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(index.next_deadline(), Some(ms(250)));

    clock.advance(ms(150));
    assert!(index.poll().notified);
    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].revision, Revision(3));
    assert!(!seen[1].immediate);
}

#[test]
fn test_cache_write_is_debounced() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let vault = MemoryVault::new();
    vault.insert("a.md", "- [ ] one\n");
    let clock = Arc::new(ManualClock::new());
    let options = IndexOptions {
        cache_path: Some(cache_path.clone()),
        ..IndexOptions::default()
    };
    let mut index = Index::with_clock(vault, options, clock.clone());

    index.warm_start().unwrap();
    clock.advance(ms(600));
    index.scan_file(&DocPath::new("a.md"));

    clock.advance(ms(900));
    assert!(!index.poll().cache_flushed);
    assert!(!cache_path.exists());

    clock.advance(ms(100));
    assert!(index.poll().cache_flushed);
    let cache = CacheFile::load(&cache_path).unwrap();
    assert_eq!(cache.item_count(), 1);
    assert_eq!(index.next_deadline(), None);
}

#[test]
fn test_unreadable_document_has_no_records() {
    let vault = MemoryVault::new();
    vault.insert("ok.md", "- [ ] fine\n");
    vault.insert("bad.md", "- [ ] hidden\n");
    vault.set_unreadable("bad.md", true);
    let (mut index, _) = memory_index(vault);

    let report = index.warm_start().unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.items, 1);
    assert_eq!(index.scan_metrics().read_failures, 1);

    index.source().set_unreadable("bad.md", false);
    index.apply_event(&DocEvent::Modified(DocPath::new("bad.md")));
    assert_eq!(index.len(), 2);

    index.source().set_unreadable("ok.md", true);
    assert_eq!(index.scan_file(&DocPath::new("ok.md")), 0);
    assert_eq!(index.len(), 1);

    index.source().remove(&DocPath::new("bad.md"));
    index.apply_event(&DocEvent::Deleted(DocPath::new("bad.md")));
    assert!(index.is_empty());
}
