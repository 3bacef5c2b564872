//! Record model for indexed tasks and blocks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Task,
    Block,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Task => "task",
            RecordKind::Block => "block",
        }
    }
}

/// Checkbox state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// Classify a checkbox glyph (the character between the brackets)
    pub fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            ' ' => Some(TaskStatus::Open),
            'x' | 'X' => Some(TaskStatus::Done),
            '-' => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "open" => Some(TaskStatus::Open),
            "done" => Some(TaskStatus::Done),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Task priority, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Highest => "highest",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Lowest => "lowest",
        }
    }

    /// Numeric rank, 1 for highest
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Highest => 1,
            Priority::High => 2,
            Priority::Medium => 3,
            Priority::Low => 4,
            Priority::Lowest => 5,
        }
    }
}

/// Value of an unrecognized `key::value` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ExtraValue {
    /// Coerce raw text: numbers become numbers, `true`/`false` become booleans
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return ExtraValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return ExtraValue::Bool(false);
        }
        if looks_numeric(trimmed) {
            if let Ok(number) = trimmed.parse::<f64>() {
                if number.is_finite() {
                    return ExtraValue::Number(number);
                }
            }
        }
        ExtraValue::Text(trimmed.to_string())
    }
}

impl fmt::Display for ExtraValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtraValue::Bool(b) => write!(f, "{b}"),
            ExtraValue::Number(n) => write!(f, "{}", format_number(*n)),
            ExtraValue::Text(s) => f.write_str(s),
        }
    }
}

// Rejects forms f64::from_str accepts but that read as words ("inf", "NaN").
fn looks_numeric(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Render a number without a trailing `.0` for integral values
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Dates attached to a task through marker glyphs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerDates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<String>,
}

impl MarkerDates {
    /// Pick the date used for chronological ordering of a task
    pub fn primary(&self, status: TaskStatus) -> Option<String> {
        match status {
            TaskStatus::Done => self.done.clone(),
            TaskStatus::Cancelled => self.cancelled.clone(),
            TaskStatus::Open => self
                .due
                .as_ref()
                .or(self.scheduled.as_ref())
                .or(self.start.as_ref())
                .or(self.created.as_ref())
                .cloned(),
        }
    }
}

/// A parsed task or block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// `<path>:<line>`, unique within the index
    pub id: String,

    /// Vault-relative path of the owning document
    pub path: String,

    /// 1-based line of the task, or of the block-start delimiter
    pub line: usize,

    /// 1-based line of the block-end delimiter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,

    pub title: String,

    /// Raw task line, or block body text
    pub content: String,

    pub kind: RecordKind,

    /// Checkbox state name for tasks, free text for blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    pub category: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Verbatim repeat phrase, or "none"
    pub recurrence_text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_date: Option<String>,

    /// Document creation time (ms since epoch)
    pub created: i64,

    /// Document modification time (ms since epoch)
    pub modified: i64,

    /// Enclosing heading, tags stripped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(default)]
    pub dates: MarkerDates,

    #[serde(default)]
    pub extra: BTreeMap<String, ExtraValue>,
}

impl Record {
    pub fn record_id(path: &str, line: usize) -> String {
        format!("{path}:{line}")
    }

    /// Split a record id back into path and 1-based line
    pub fn parse_id(id: &str) -> Option<(&str, usize)> {
        let (path, line) = id.rsplit_once(':')?;
        let line = line.parse::<usize>().ok()?;
        if path.is_empty() || line == 0 {
            return None;
        }
        Some((path, line))
    }

    pub fn is_task(&self) -> bool {
        self.kind == RecordKind::Task
    }

    pub fn task_status(&self) -> Option<TaskStatus> {
        if !self.is_task() {
            return None;
        }
        self.status.as_deref().and_then(TaskStatus::from_name)
    }

    pub fn has_recurrence(&self) -> bool {
        self.recurrence_text != NO_RECURRENCE
    }
}

/// `recurrence_text` of a record without a repeat phrase
pub const NO_RECURRENCE: &str = "none";
