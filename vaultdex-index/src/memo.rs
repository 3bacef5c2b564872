//! Memoized query results
//!
//! Results are keyed by the filter and sort rules and tagged with the
//! revision they were computed at. Any revision change empties the table.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vaultdex_core::{FilterRule, Record, SortRule};

use crate::revision::Revision;

type MemoKey = (Vec<FilterRule>, Vec<SortRule>);

#[derive(Debug, Default)]
struct MemoState {
    revision: Revision,
    entries: HashMap<MemoKey, Arc<Vec<Record>>>,
}

/// Memo table shared by readers of one index
#[derive(Debug, Default)]
pub struct QueryMemo {
    state: Mutex<MemoState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Snapshot of memo effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    /// Lookups answered from the table
    pub hits: u64,
    /// Lookups that ran the query
    pub misses: u64,
    /// Entries held for the current revision
    pub entries: usize,
}

impl MemoStats {
    /// Hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl QueryMemo {
    /// Create an empty memo
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized result for the rules at `revision`, computing it on a miss
    pub fn get_or_compute<F>(
        &self,
        revision: Revision,
        filters: &[FilterRule],
        sort: &[SortRule],
        compute: F,
    ) -> Arc<Vec<Record>>
    where
        F: FnOnce() -> Vec<Record>,
    {
        let key = (filters.to_vec(), sort.to_vec());
        let mut state = self.state.lock();
        if state.revision != revision {
            state.entries.clear();
            state.revision = revision;
        }

        if let Some(result) = state.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(result);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = Arc::new(compute());
        state.entries.insert(key, Arc::clone(&result));
        result
    }

    /// Current counters
    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.state.lock().entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultdex_core::Operator;

    #[test]
    fn test_hit_until_revision_changes() {
        let memo = QueryMemo::new();
        let filters = vec![FilterRule::new("status", Operator::Eq, "open")];
        let mut runs = 0;

        let first = memo.get_or_compute(Revision(1), &filters, &[], || {
            runs += 1;
            Vec::new()
        });
        let second = memo.get_or_compute(Revision(1), &filters, &[], || {
            runs += 1;
            Vec::new()
        });
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runs, 1);

        memo.get_or_compute(Revision(2), &filters, &[], || {
            runs += 1;
            Vec::new()
        });
        assert_eq!(runs, 2);

        let stats = memo.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_distinct_rules_are_distinct_entries() {
        let memo = QueryMemo::new();
        memo.get_or_compute(Revision(1), &[], &[SortRule::asc("due")], Vec::new);
        memo.get_or_compute(Revision(1), &[], &[SortRule::desc("due")], Vec::new);
        assert_eq!(memo.stats().entries, 2);
    }
}
