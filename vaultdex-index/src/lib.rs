//! vaultdex record index
//!
//! This crate keeps the records of a vault in memory and up to date. It
//! owns the per-document record partitions, restores unchanged documents
//! from a persisted cache at startup, memoizes queries per revision and
//! tells subscribers when the index changed.
//!
//! # Architecture
//!
//! ```text
//! change event → rescan document → replace partition → bump revision
//!              → debounced cache write → throttled change notice
//! ```
//!
//! Timers never read the wall clock on their own: the host calls
//! [`Index::poll`] and may sleep until [`Index::next_deadline`].
//!
//! # Example
//!
//! ```rust
//! use vaultdex_core::{FilterRule, Operator};
//! use vaultdex_index::{Index, IndexOptions, MemoryVault};
//!
//! let vault = MemoryVault::new();
//! vault.insert("inbox.md", "- [ ] Call the bank\n- [x] Pay rent\n");
//!
//! let mut index = Index::new(vault, IndexOptions::default());
//! index.warm_start().unwrap();
//!
//! let open = index.query_items(&[FilterRule::new("status", Operator::Eq, "open")], &[]);
//! assert_eq!(open.len(), 1);
//! assert_eq!(open[0].title, "Call the bank");
//! ```

#![warn(missing_debug_implementations)]

pub mod cache;
pub mod memo;
pub mod metrics;
pub mod notifier;
pub mod revision;
pub mod store;
pub mod timer;
pub mod vault;

pub use cache::{CacheError, CacheFile, DocumentCacheEntry, SCHEMA_VERSION};
pub use memo::{MemoStats, QueryMemo};
pub use metrics::{PerfEntry, PerfLog, PerfLogError, ScanSnapshot};
pub use notifier::{ChangeNotice, ChangeNotifier, Listener, SubscriptionId};
pub use revision::Revision;
pub use store::{Index, IndexOptions, MutationError, PollOutcome, WarmStartReport};
pub use timer::{Clock, ManualClock, SystemClock, Timer};
pub use vault::{DocumentSource, FsVault, MemoryVault, VaultError};
pub use vaultdex_types::{DocEvent, DocPath};
