//! Delimited multi-line block parsing.
//!
//! A block is the span between a start and an end delimiter line. It opens
//! with a `key::value` header and continues with free text.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::models::{ExtraValue, MarkerDates, Record, RecordKind, NO_RECURRENCE};
use crate::text::{self, split_leading_icon, split_tag_list};

/// Maximum number of characters kept in a block title
pub const BLOCK_TITLE_BUDGET: usize = 10;

static HEADER_REGEX: OnceLock<Regex> = OnceLock::new();

/// `key::value` header line; the key is at most 20 characters
fn header_regex() -> &'static Regex {
    HEADER_REGEX.get_or_init(|| Regex::new(r"^\s*([^\s:][^:]{0,19})::(.*)$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKey {
    Category,
    Tags,
    Status,
    Date,
    Content,
    Icon,
}

impl HeaderKey {
    fn classify(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "category" | "cat" => Some(HeaderKey::Category),
            "tags" | "tag" | "theme" | "themes" => Some(HeaderKey::Tags),
            "status" => Some(HeaderKey::Status),
            "date" => Some(HeaderKey::Date),
            "content" | "body" => Some(HeaderKey::Content),
            "icon" => Some(HeaderKey::Icon),
            _ => None,
        }
    }
}

/// Where the block sits in its document
#[derive(Debug, Clone, Copy)]
pub struct BlockContext<'a> {
    pub path: &'a str,
    pub folder: &'a str,
    /// 0-based index of the start delimiter line
    pub start: usize,
    /// 0-based index of the end delimiter line
    pub end: usize,
}

/// Parse the lines strictly between the two delimiters of a block
///
/// Never fails on malformed input; returns `None` only when the block yields
/// neither body text nor tags.
pub fn parse_block(lines: &[&str], ctx: BlockContext<'_>) -> Option<Record> {
    let inner_start = (ctx.start + 1).min(lines.len());
    let inner_end = ctx.end.clamp(inner_start, lines.len());
    let span = &lines[inner_start..inner_end];

    let mut category: Option<String> = None;
    let mut tag_labels: Vec<String> = Vec::new();
    let mut status: Option<String> = None;
    let mut date: Option<String> = None;
    let mut icon: Option<String> = None;
    let mut extra = BTreeMap::new();
    let mut body: Vec<&str> = Vec::new();
    let mut in_header = true;

    for line in span {
        if !in_header {
            body.push(line);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let Some(caps) = header_regex().captures(line) else {
            in_header = false;
            body.push(line);
            continue;
        };
        let key = caps[1].trim();
        let value = caps.get(2).map_or("", |m| m.as_str()).trim();

        match HeaderKey::classify(key) {
            Some(HeaderKey::Category) => category = Some(value.to_string()),
            Some(HeaderKey::Tags) => tag_labels.extend(split_tag_list(value)),
            Some(HeaderKey::Status) => status = Some(value.to_string()),
            Some(HeaderKey::Date) => date = Some(text::normalize_or_raw(value)),
            Some(HeaderKey::Icon) => icon = Some(value.to_string()).filter(|v| !v.is_empty()),
            Some(HeaderKey::Content) => {
                in_header = false;
                if !value.is_empty() {
                    body.push(value);
                }
            }
            None => {
                extra.insert(key.to_string(), ExtraValue::coerce(value));
            }
        }
    }

    let body_text = body.join("\n");
    let seed = match body.iter().find(|l| !l.trim().is_empty()) {
        Some(first) => first.trim().to_string(),
        None => tag_labels.join(" "),
    };
    if seed.is_empty() && tag_labels.is_empty() {
        return None;
    }

    let (leading_icon, rest) = split_leading_icon(&seed);
    let title = text::truncate_chars(&rest, BLOCK_TITLE_BUDGET);
    let tags: BTreeSet<String> = tag_labels.into_iter().collect();
    let line = ctx.start + 1;

    Some(Record {
        id: Record::record_id(ctx.path, line),
        path: ctx.path.to_string(),
        line,
        end_line: Some(ctx.end + 1),
        title,
        content: body_text,
        kind: RecordKind::Block,
        status: status.filter(|s| !s.is_empty()),
        category: category
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| ctx.folder.to_string()),
        tags,
        recurrence_text: NO_RECURRENCE.to_string(),
        primary_date: date.filter(|d| !d.is_empty()),
        created: 0,
        modified: 0,
        header: None,
        icon: icon.or(leading_icon),
        priority: None,
        dates: MarkerDates::default(),
        extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Option<Record> {
        let lines: Vec<&str> = source.lines().collect();
        let end = lines.len() - 1;
        parse_block(
            &lines,
            BlockContext {
                path: "journal/2024.md",
                folder: "journal",
                start: 0,
                end,
            },
        )
    }

    #[test]
    fn test_header_and_body() {
        let record = parse(
            "```record\n\
             category:: reading\n\
             tags:: books, #fiction\n\
             status:: in progress\n\
             date:: 2024/05/06\n\
             rating:: 4.5\n\
             \n\
             Finished the second part.\n\
             Slow middle chapters.\n\
             ```",
        )
        .unwrap();

        assert_eq!(record.kind, RecordKind::Block);
        assert_eq!(record.id, "journal/2024.md:1");
        assert_eq!(record.end_line, Some(10));
        assert_eq!(record.category, "reading");
        assert_eq!(record.status.as_deref(), Some("in progress"));
        assert_eq!(record.primary_date.as_deref(), Some("2024-05-06"));
        assert_eq!(record.extra.get("rating"), Some(&ExtraValue::Number(4.5)));
        assert!(record.tags.contains("books"));
        assert!(record.tags.contains("fiction"));
        assert_eq!(record.content, "Finished the second part.\nSlow middle chapters.");
        assert_eq!(record.title, "Finished t");
    }

    #[test]
    fn test_content_key_ends_header() {
        let record = parse("```record\ncontent:: 🎵 Piano practice\nmood:: calm\n```").unwrap();
        assert_eq!(record.content, "🎵 Piano practice\nmood:: calm");
        assert_eq!(record.icon.as_deref(), Some("🎵"));
        assert_eq!(record.title, "Piano prac");
        assert!(record.extra.is_empty());
        assert_eq!(record.category, "journal");
    }

    #[test]
    fn test_title_from_tags_when_body_empty() {
        let record = parse("```record\ntheme:: focus, health\n```").unwrap();
        assert_eq!(record.title, "focus heal");
        assert_eq!(record.content, "");
    }

    #[test]
    fn test_empty_block_yields_nothing() {
        assert!(parse("```record\n\n```").is_none());
        assert!(parse("```record\nstatus:: done\n```").is_none());
    }

    #[test]
    fn test_long_key_is_body_text() {
        let record = parse("```record\nthis key is definitely too long:: value\n```").unwrap();
        assert_eq!(record.content, "this key is definitely too long:: value");
    }

    #[test]
    fn test_explicit_icon_wins() {
        let record = parse("```record\nicon:: 📚\n🎵 Notes\n```").unwrap();
        assert_eq!(record.icon.as_deref(), Some("📚"));
        assert_eq!(record.title, "Notes");
    }
}
