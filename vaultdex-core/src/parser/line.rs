//! Single-line task parsing.
//!
//! A task is a line starting with `- [ ]`, `- [x]` or `- [-]`, carrying inline
//! `#tags`, a repeat phrase, `(key::value)` pairs, dated markers and a
//! priority glyph.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{ExtraValue, MarkerDates, Priority, Record, RecordKind, TaskStatus, NO_RECURRENCE};
use crate::recurrence::parse_recurrence;
use crate::text::{
    self, checkbox_regex, collect_tags, inline_field_regex, is_tag_key, repeat_regex,
    split_leading_icon, split_tag_list, Marker, PRIORITY_GLYPHS,
};

/// Location of the line being parsed
#[derive(Debug, Clone, Copy)]
pub struct LineContext<'a> {
    /// Vault-relative document path
    pub path: &'a str,
    /// Name of the folder containing the document
    pub folder: &'a str,
    /// 1-based line number
    pub line: usize,
}

/// Classify the checkbox prefix of a line, if it has one
pub fn task_status(line: &str) -> Option<TaskStatus> {
    let caps = checkbox_regex().captures(line)?;
    caps.get(2)
        .and_then(|m| m.as_str().chars().next())
        .and_then(TaskStatus::from_glyph)
}

/// Parse one raw line into a task record
///
/// Returns `None` when the line has no checkbox prefix.
pub fn parse_task_line(raw: &str, ctx: LineContext<'_>) -> Option<Record> {
    let prefix = checkbox_regex().captures(raw)?;
    let status = prefix
        .get(2)
        .and_then(|m| m.as_str().chars().next())
        .and_then(TaskStatus::from_glyph)?;
    let body = &raw[prefix.get(0).map_or(0, |m| m.end())..];

    let mut tags: BTreeSet<String> = collect_tags(body).into_iter().collect();

    // A phrase the recurrence engine rejects (e.g. `every 0 days`) does not repeat
    let recurrence_text = repeat_regex()
        .find(body)
        .filter(|m| parse_recurrence(m.as_str()).is_some())
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| NO_RECURRENCE.to_string());

    let mut extra = BTreeMap::new();
    for caps in inline_field_regex().captures_iter(body) {
        let key = caps[1].trim();
        let value = &caps[2];
        if is_tag_key(key) {
            tags.extend(split_tag_list(value));
        } else {
            extra.insert(key.to_string(), ExtraValue::coerce(value));
        }
    }

    let dates = marker_dates(body);
    let priority = detect_priority(body);

    let (icon, rest) = split_leading_icon(body);
    let title = clean_title(&rest);

    let primary_date = dates.primary(status);

    Some(Record {
        id: Record::record_id(ctx.path, ctx.line),
        path: ctx.path.to_string(),
        line: ctx.line,
        end_line: None,
        title,
        content: raw.to_string(),
        kind: RecordKind::Task,
        status: Some(status.as_str().to_string()),
        category: ctx.folder.to_string(),
        tags,
        recurrence_text,
        primary_date,
        created: 0,
        modified: 0,
        header: None,
        icon,
        priority,
        dates,
        extra,
    })
}

/// Read every marker date present in the text
pub fn marker_dates(text: &str) -> MarkerDates {
    let find = |marker: Marker| {
        marker
            .regex()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| text::normalize_or_raw(m.as_str()))
    };

    MarkerDates {
        done: find(Marker::Done),
        cancelled: find(Marker::Cancelled),
        due: find(Marker::Due),
        scheduled: find(Marker::Scheduled),
        start: find(Marker::Start),
        created: find(Marker::Created),
    }
}

/// First priority glyph present, in ranking order
pub fn detect_priority(text: &str) -> Option<Priority> {
    PRIORITY_GLYPHS
        .iter()
        .find(|(glyph, _)| text.contains(glyph))
        .map(|(_, priority)| *priority)
}

/// Remove every consumed token from the task text
fn clean_title(text: &str) -> String {
    let mut title = repeat_regex().replace_all(text, " ").into_owned();
    title = inline_field_regex().replace_all(&title, " ").into_owned();
    for marker in Marker::ALL {
        title = marker.regex().replace_all(&title, " ").into_owned();
    }
    for (glyph, _) in PRIORITY_GLYPHS {
        title = title.replace(glyph, " ");
    }
    text::strip_tags(&title)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> LineContext<'static> {
        LineContext {
            path: "work/todo.md",
            folder: "work",
            line: 3,
        }
    }

    #[test]
    fn test_non_task_lines() {
        assert!(parse_task_line("plain text", ctx()).is_none());
        assert!(parse_task_line("- plain bullet", ctx()).is_none());
        assert!(parse_task_line("- [?] odd glyph", ctx()).is_none());
        assert!(parse_task_line("-[ ] no space", ctx()).is_none());
    }

    #[test]
    fn test_status_classification() {
        let open = parse_task_line("- [ ] a", ctx()).unwrap();
        let done = parse_task_line("- [X] a", ctx()).unwrap();
        let cancelled = parse_task_line("  - [-] a", ctx()).unwrap();
        assert_eq!(open.status.as_deref(), Some("open"));
        assert_eq!(done.status.as_deref(), Some("done"));
        assert_eq!(cancelled.status.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_full_line() {
        let line = "- [ ] 🏃 Morning run #health #health (tags:: fitness, outdoors) \
                    (distance:: 5) (shoes:: new) (race:: TRUE) ⏫ 🔁 every 2 weeks \
                    ⏳ 2024/03/02 📅 2024-03-05 ➕ 2024-02-28";
        let record = parse_task_line(line, ctx()).unwrap();

        assert_eq!(record.id, "work/todo.md:3");
        assert_eq!(record.title, "Morning run");
        assert_eq!(record.icon.as_deref(), Some("🏃"));
        assert_eq!(record.category, "work");
        assert_eq!(record.content, line);
        assert_eq!(
            record.tags.iter().cloned().collect::<Vec<_>>(),
            vec!["fitness", "health", "outdoors"]
        );
        assert_eq!(record.recurrence_text, "🔁 every 2 weeks");
        assert_eq!(record.priority, Some(Priority::High));
        assert_eq!(record.dates.scheduled.as_deref(), Some("2024-03-02"));
        assert_eq!(record.dates.due.as_deref(), Some("2024-03-05"));
        assert_eq!(record.dates.created.as_deref(), Some("2024-02-28"));
        assert_eq!(record.primary_date.as_deref(), Some("2024-03-05"));
        assert_eq!(record.extra.get("distance"), Some(&ExtraValue::Number(5.0)));
        assert_eq!(record.extra.get("shoes"), Some(&ExtraValue::Text("new".into())));
        assert_eq!(record.extra.get("race"), Some(&ExtraValue::Bool(true)));
    }

    #[test]
    fn test_done_primary_date() {
        let record =
            parse_task_line("- [x] File taxes 📅 2024-04-15 ✅ 2024-04-10", ctx()).unwrap();
        assert_eq!(record.primary_date.as_deref(), Some("2024-04-10"));
        assert_eq!(record.title, "File taxes");
    }

    #[test]
    fn test_malformed_date_passes_through() {
        let record = parse_task_line("- [ ] Call 📅 someday", ctx()).unwrap();
        assert_eq!(record.dates.due.as_deref(), Some("someday"));
        assert_eq!(record.title, "Call");
    }

    #[test]
    fn test_no_recurrence() {
        let record = parse_task_line("- [ ] Once", ctx()).unwrap();
        assert_eq!(record.recurrence_text, NO_RECURRENCE);
        assert!(record.primary_date.is_none());
        assert!(record.icon.is_none());
    }

    #[test]
    fn test_dateless_marker_keeps_repeat_phrase() {
        let record = parse_task_line("- [ ] Pay 📅 🔁 every week", ctx()).unwrap();
        assert!(record.dates.due.is_none());
        assert_eq!(record.recurrence_text, "🔁 every week");
        assert!(record.has_recurrence());
    }

    #[test]
    fn test_zero_interval_is_not_a_recurrence() {
        let record = parse_task_line("- [ ] Never 🔁 every 0 days", ctx()).unwrap();
        assert_eq!(record.recurrence_text, NO_RECURRENCE);
        assert!(!record.has_recurrence());
    }

    #[test]
    fn test_priority_ranking_prefers_highest() {
        let record = parse_task_line("- [ ] Mixed 🔽 🔺", ctx()).unwrap();
        assert_eq!(record.priority, Some(Priority::Highest));
    }

    #[test]
    fn test_empty_task_body() {
        let record = parse_task_line("- [ ]", ctx()).unwrap();
        assert_eq!(record.title, "");
    }
}
