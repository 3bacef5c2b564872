//! Recurring tasks: repeat-phrase parsing, completion and next occurrence.
//!
//! The descriptor is never stored. It is re-read from the raw line whenever a
//! task is completed, so it always agrees with the text it came from.

use chrono::{Days, Months, NaiveDate, NaiveTime};
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::OnceLock;

use crate::text::{self, checkbox_regex, repeat_regex, Marker, DONE_GLYPH, REPEAT_GLYPH};

/// Calendar unit of a repeat phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecurrenceUnit {
    Day,
    Week,
    Month,
    Year,
}

impl RecurrenceUnit {
    fn from_word(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "day" => Some(RecurrenceUnit::Day),
            "week" => Some(RecurrenceUnit::Week),
            "month" => Some(RecurrenceUnit::Month),
            "year" => Some(RecurrenceUnit::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceUnit::Day => "day",
            RecurrenceUnit::Week => "week",
            RecurrenceUnit::Month => "month",
            RecurrenceUnit::Year => "year",
        }
    }
}

/// `{interval, unit, whenDone}` read from a `🔁 every ...` phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Recurrence {
    pub interval: u32,
    pub unit: RecurrenceUnit,
    pub when_done: bool,
}

impl Recurrence {
    /// Advance `base` by one interval using calendar arithmetic
    ///
    /// Month and year steps clamp to the last day of shorter months.
    pub fn advance(&self, base: NaiveDate) -> Option<NaiveDate> {
        let n = self.interval;
        match self.unit {
            RecurrenceUnit::Day => base.checked_add_days(Days::new(u64::from(n))),
            RecurrenceUnit::Week => base.checked_add_days(Days::new(7 * u64::from(n))),
            RecurrenceUnit::Month => base.checked_add_months(Months::new(n)),
            RecurrenceUnit::Year => base.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {} {}", self.interval, self.unit.as_str())?;
        if self.interval != 1 {
            f.write_str("s")?;
        }
        if self.when_done {
            f.write_str(" when done")?;
        }
        Ok(())
    }
}

/// Read the repeat phrase of a task line, if any
pub fn parse_recurrence(text: &str) -> Option<Recurrence> {
    let caps = repeat_regex().captures(text)?;
    let interval = match caps.get(1) {
        Some(m) => m.as_str().parse::<u32>().ok().filter(|n| *n > 0)?,
        None => 1,
    };
    let unit = RecurrenceUnit::from_word(caps.get(2)?.as_str())?;
    Some(Recurrence {
        interval,
        unit,
        when_done: caps.get(3).is_some(),
    })
}

/// Result of completing a task line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The line rewritten to the done state
    pub done_line: String,
    /// The next occurrence, for recurring tasks
    pub next_line: Option<String>,
}

static TIME_TOKEN: OnceLock<Regex> = OnceLock::new();
static DONE_TOKEN: OnceLock<Regex> = OnceLock::new();

fn time_token_regex() -> &'static Regex {
    TIME_TOKEN.get_or_init(|| field_token_regex("time"))
}

fn done_token_regex() -> &'static Regex {
    DONE_TOKEN.get_or_init(|| {
        Regex::new(&format!(r"\s*{}\x{{FE0F}}?\s*\S+", regex::escape(DONE_GLYPH))).unwrap()
    })
}

/// Parenthetical `(key::value)` token with any leading whitespace
fn field_token_regex(key: &str) -> Regex {
    RegexBuilder::new(&format!(r"\s*\(\s*{}\s*::[^()]*\)", regex::escape(key)))
        .case_insensitive(true)
        .build()
        .unwrap()
}

/// Bare `key::value` token not wrapped in parentheses
fn bare_field_regex(key: &str) -> Regex {
    RegexBuilder::new(&format!(r"(^|[^(\w]){}::(\S+)", regex::escape(key)))
        .case_insensitive(true)
        .build()
        .unwrap()
}

/// Complete a task line
///
/// Wraps a bare duration token, stamps the time of day, flips the checkbox,
/// replaces any earlier done marker with one for `today`. When the line
/// repeats, the next occurrence is generated from the completed line.
pub fn mark_done(raw: &str, today: NaiveDate, now: NaiveTime) -> Completion {
    let done_line = mark_done_line(raw, today, now);
    let next_line = parse_recurrence(raw).and_then(|recurrence| {
        let base = find_base_date_for_recurring(raw, recurrence.when_done, today);
        generate_next_recurring_task(&done_line, base)
    });
    Completion {
        done_line,
        next_line,
    }
}

/// The done-state rewrite on its own, without next-occurrence generation
pub fn mark_done_line(raw: &str, today: NaiveDate, now: NaiveTime) -> String {
    let mut line = wrap_bare_duration(raw);
    line = time_token_regex().replace_all(&line, "").into_owned();

    let time_token = format!("(time::{})", now.format("%H:%M"));
    line = insert_token(&line, &time_token);

    line = set_checkbox(&line, 'x');
    line = done_token_regex().replace_all(&line, "").into_owned();

    format!("{} {} {}", line.trim_end(), DONE_GLYPH, today.format("%Y-%m-%d"))
}

/// Choose the date a recurring task advances from
///
/// `when done` tasks advance from today; others from the first of their due,
/// scheduled or start dates, falling back to today.
pub fn find_base_date_for_recurring(raw: &str, when_done: bool, today: NaiveDate) -> NaiveDate {
    if when_done {
        return today;
    }
    [Marker::Due, Marker::Scheduled, Marker::Start]
        .iter()
        .find_map(|marker| {
            marker
                .regex()
                .captures(raw)
                .and_then(|caps| caps.get(1))
                .and_then(|m| text::parse_date(m.as_str()))
        })
        .unwrap_or(today)
}

/// Build the next occurrence of a recurring task line
///
/// Returns `None` when the line has no repeat phrase or the date overflows.
pub fn generate_next_recurring_task(raw: &str, base: NaiveDate) -> Option<String> {
    let recurrence = parse_recurrence(raw)?;
    let next = recurrence.advance(base)?;
    let next_text = next.format("%Y-%m-%d").to_string();

    let mut line = set_checkbox(raw, ' ');
    line = done_token_regex().replace_all(&line, "").into_owned();
    line = time_token_regex().replace_all(&line, "").into_owned();

    for marker in [Marker::Due, Marker::Scheduled, Marker::Start] {
        line = marker
            .regex()
            .replace(&line, |caps: &regex::Captures| {
                let whole = &caps[0];
                let date = &caps[1];
                format!("{}{}", &whole[..whole.len() - date.len()], next_text)
            })
            .into_owned();
    }

    Some(line.trim_end().to_string())
}

/// Values for the time-related tokens of a task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeUpdate {
    pub time: Option<String>,
    pub end_time: Option<String>,
    pub duration: Option<String>,
}

impl TimeUpdate {
    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.end_time.is_none() && self.duration.is_none()
    }
}

/// Replace or insert the `(time::)`, `(endTime::)` and `(duration::)` tokens
pub fn set_time_fields(raw: &str, update: &TimeUpdate) -> String {
    let mut line = wrap_bare_duration(raw);
    let fields = [
        ("time", update.time.as_deref()),
        ("endTime", update.end_time.as_deref()),
        ("duration", update.duration.as_deref()),
    ];

    for (key, value) in fields {
        let Some(value) = value.map(str::trim) else {
            continue;
        };
        let token = format!("({key}::{value})");
        let pattern = field_token_regex(key);
        line = if pattern.is_match(&line) {
            let replacement = format!(" {token}");
            pattern
                .replace(&line, regex::NoExpand(replacement.as_str()))
                .into_owned()
        } else {
            insert_token(&line, &token)
        };
    }

    line.trim_end().to_string()
}

fn wrap_bare_duration(line: &str) -> String {
    bare_field_regex("duration")
        .replace_all(line, "${1}(duration::${2})")
        .into_owned()
}

/// Insert a token before the duration token, else before the repeat glyph,
/// else at the end of the line
fn insert_token(line: &str, token: &str) -> String {
    static DURATION: OnceLock<Regex> = OnceLock::new();
    let duration = DURATION.get_or_init(|| field_token_regex("duration"));

    let anchor = duration
        .find(line)
        .map(|m| m.start() + (m.as_str().len() - m.as_str().trim_start().len()))
        .or_else(|| line.find(REPEAT_GLYPH));

    match anchor {
        Some(pos) => format!("{} {} {}", line[..pos].trim_end(), token, &line[pos..]),
        None => format!("{} {}", line.trim_end(), token),
    }
}

/// Set the checkbox glyph, adding a `- [ ]` prefix when the line lacks one
fn set_checkbox(line: &str, glyph: char) -> String {
    match checkbox_regex().captures(line) {
        Some(caps) => {
            let indent = caps.get(1).map_or("", |m| m.as_str());
            let rest = &line[caps.get(0).map_or(0, |m| m.end())..];
            format!("{indent}- [{glyph}] {rest}")
        }
        None => {
            let trimmed = line.trim_start();
            let indent = &line[..line.len() - trimmed.len()];
            let rest = trimmed
                .strip_prefix("- ")
                .map(str::trim_start)
                .unwrap_or(trimmed);
            format!("{indent}- [{glyph}] {rest}")
        }
    }
}
