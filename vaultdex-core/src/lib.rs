//! # vaultdex-core
//!
//! Core library for the vaultdex record index.
//!
//! This crate turns markdown documents into typed records: single-line tasks
//! and delimited multi-line blocks. It also holds the recurrence rewriting
//! rules, the filter/sort evaluation used by queries, and configuration.

pub mod config;
pub mod headings;
pub mod models;
pub mod parser;
pub mod query;
pub mod recurrence;
pub mod scanner;
pub mod text;

pub use config::{BlocksConfig, Config, ConfigError, Placement, RecurrenceConfig, TimingConfig};
pub use headings::extract_headings;
pub use models::{ExtraValue, MarkerDates, Priority, Record, RecordKind, TaskStatus};
pub use query::{run_query, Direction, FilterRule, Operator, SortRule};
pub use recurrence::{mark_done, parse_recurrence, Completion, Recurrence, TimeUpdate};
pub use scanner::{DocumentInput, DocumentScanner};
