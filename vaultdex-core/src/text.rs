//! Text primitives shared by the parsers and the recurrence engine.
//!
//! Holds the glyph vocabulary, the compiled patterns, date normalization and
//! the pictographic icon splitter.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::Priority;

pub const DONE_GLYPH: &str = "✅";
pub const CANCELLED_GLYPH: &str = "❌";
pub const DUE_GLYPH: &str = "📅";
pub const SCHEDULED_GLYPH: &str = "⏳";
pub const START_GLYPH: &str = "🛫";
pub const CREATED_GLYPH: &str = "➕";
pub const REPEAT_GLYPH: &str = "🔁";

/// Marker kinds that carry a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Done,
    Cancelled,
    Due,
    Scheduled,
    Start,
    Created,
}

impl Marker {
    pub const ALL: [Marker; 6] = [
        Marker::Done,
        Marker::Cancelled,
        Marker::Due,
        Marker::Scheduled,
        Marker::Start,
        Marker::Created,
    ];

    pub fn glyph(&self) -> &'static str {
        match self {
            Marker::Done => DONE_GLYPH,
            Marker::Cancelled => CANCELLED_GLYPH,
            Marker::Due => DUE_GLYPH,
            Marker::Scheduled => SCHEDULED_GLYPH,
            Marker::Start => START_GLYPH,
            Marker::Created => CREATED_GLYPH,
        }
    }

    /// Pattern matching `glyph <date-token>`; group 1 is the raw date
    ///
    /// The date token never starts with a reserved glyph, so a dateless
    /// marker leaves the following marker or repeat phrase alone.
    pub fn regex(&self) -> &'static Regex {
        static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            let reserved: String = reserved_glyphs().map(regex::escape).collect();
            Marker::ALL
                .iter()
                .map(|m| {
                    Regex::new(&format!(
                        r"{}\x{{FE0F}}?\s*([^\s\x{{FE0F}}{}]\S*)",
                        regex::escape(m.glyph()),
                        reserved
                    ))
                    .expect("marker pattern")
                })
                .collect()
        });
        &patterns[*self as usize]
    }
}

/// Priority glyphs in ranking order, highest first
pub const PRIORITY_GLYPHS: [(&str, Priority); 5] = [
    ("🔺", Priority::Highest),
    ("⏫", Priority::High),
    ("🔼", Priority::Medium),
    ("🔽", Priority::Low),
    ("⏬", Priority::Lowest),
];

/// Keys whose parenthetical values are merged into the tag set
pub const TAG_KEYS: [&str; 4] = ["tag", "tags", "theme", "themes"];

pub fn is_tag_key(key: &str) -> bool {
    TAG_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key.trim()))
}

static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
static INLINE_FIELD_REGEX: OnceLock<Regex> = OnceLock::new();
static CHECKBOX_REGEX: OnceLock<Regex> = OnceLock::new();
static REPEAT_REGEX: OnceLock<Regex> = OnceLock::new();

/// `#tag` preceded by start of text or whitespace; group 1 is the tag name
pub fn tag_regex() -> &'static Regex {
    TAG_REGEX.get_or_init(|| Regex::new(r"(?:^|\s)#([\p{N}/-]*[\p{L}_][\p{L}\p{N}_/-]*)").unwrap())
}

/// Parenthetical `(key::value)` pair; groups are key and value
pub fn inline_field_regex() -> &'static Regex {
    INLINE_FIELD_REGEX
        .get_or_init(|| Regex::new(r"\(\s*([^():\s][^():]*?)\s*::\s*([^()]*?)\s*\)").unwrap())
}

/// Checkbox task prefix; groups are indentation and the state glyph
pub fn checkbox_regex() -> &'static Regex {
    CHECKBOX_REGEX.get_or_init(|| Regex::new(r"^(\s*)-\s\[([ xX-])\](?:\s+|$)").unwrap())
}

/// Repeat phrase; groups are interval, unit and the when-done suffix
pub fn repeat_regex() -> &'static Regex {
    REPEAT_REGEX.get_or_init(|| {
        Regex::new(
            r"(?i)🔁\x{FE0F}?\s*every\s+(?:(\d+)\s+)?(day|week|month|year)s?\b(\s+when\s+done)?",
        )
        .unwrap()
    })
}

/// Collect `#tag` tokens from text, in order of appearance
pub fn collect_tags(text: &str) -> Vec<String> {
    tag_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('/').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Remove `#tag` tokens from text, collapsing the whitespace they leave
pub fn strip_tags(text: &str) -> String {
    collapse_whitespace(&tag_regex().replace_all(text, " "))
}

/// Split a comma-separated tag list, dropping `#` prefixes and blanks
pub fn split_tag_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim().trim_start_matches('#').trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize a `YYYY-MM-DD` or `YYYY/MM/DD` date to the hyphenated form
///
/// Returns `None` when the input is not a valid calendar date.
///
/// ```
/// use vaultdex_core::text::normalize_date;
///
/// assert_eq!(normalize_date("2024/3/01"), None);
/// assert_eq!(normalize_date("2024/03/01").as_deref(), Some("2024-03-01"));
/// ```
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date(raw).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Parse a `YYYY-MM-DD` or `YYYY/MM/DD` date
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
}

/// Normalize a marker date, passing malformed input through unchanged
pub fn normalize_or_raw(raw: &str) -> String {
    normalize_date(raw).unwrap_or_else(|| raw.to_string())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Glyphs with a grammatical meaning
fn reserved_glyphs() -> impl Iterator<Item = &'static str> {
    Marker::ALL
        .into_iter()
        .map(|m| m.glyph())
        .chain(std::iter::once(REPEAT_GLYPH))
        .chain(PRIORITY_GLYPHS.into_iter().map(|(g, _)| g))
}

/// Reserved glyphs are never taken as an icon or a date
fn is_reserved_glyph(grapheme: &str) -> bool {
    let base = grapheme.trim_end_matches('\u{FE0F}');
    reserved_glyphs().any(|g| g == base)
}

fn is_pictographic(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF
        | 0x2600..=0x27BF
        | 0x2B00..=0x2BFF
        | 0x2300..=0x23FF
        | 0x2190..=0x21FF
        | 0x3297 | 0x3299 | 0x00A9 | 0x00AE | 0x203C | 0x2049 | 0x2122 | 0x2139)
}

/// Split a leading run of pictographic graphemes off the text
///
/// Returns the icon (if any) and the remaining text, trimmed.
pub fn split_leading_icon(text: &str) -> (Option<String>, String) {
    let trimmed = text.trim_start();
    let mut end = 0;
    for (offset, grapheme) in trimmed.grapheme_indices(true) {
        let first = match grapheme.chars().next() {
            Some(c) => c,
            None => break,
        };
        if !is_pictographic(first) || is_reserved_glyph(grapheme) {
            break;
        }
        end = offset + grapheme.len();
    }

    if end == 0 {
        return (None, trimmed.trim_end().to_string());
    }
    (
        Some(trimmed[..end].to_string()),
        trimmed[end..].trim().to_string(),
    )
}

/// Truncate to at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
