//! Filter and sort evaluation over records.
//!
//! Rules are plain values; memoization lives with the index that owns the
//! records.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{format_number, ExtraValue, Record};

/// Comparison applied by a filter rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "includes")]
    Includes,
    #[serde(rename = "regex")]
    Regex,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Includes => "includes",
            Operator::Regex => "regex",
            Operator::Gt => ">",
            Operator::Lt => "<",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// `{field, operator, value}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterRule {
    pub field: String,
    #[serde(rename = "op")]
    pub operator: Operator,
    pub value: String,
}

impl FilterRule {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator.as_str(), self.value)
    }
}

/// `{field, direction}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortRule {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

impl SortRule {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("Missing operator in filter rule: {0}")]
    MissingOperator(String),

    #[error("Empty field name in rule: {0}")]
    EmptyField(String),

    #[error("Unknown sort direction: {0}")]
    UnknownDirection(String),
}

impl FromStr for FilterRule {
    type Err = RuleParseError;

    /// Parse `field=value`, `field!=value`, `field>value`, `field<value`,
    /// `field includes value` or `field regex value`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        let mut words = trimmed.splitn(3, char::is_whitespace);
        if let (Some(field), Some(op), Some(value)) = (words.next(), words.next(), words.next()) {
            let operator = match op.to_lowercase().as_str() {
                "includes" => Some(Operator::Includes),
                "regex" => Some(Operator::Regex),
                _ => None,
            };
            if let Some(operator) = operator {
                return Ok(FilterRule::new(field, operator, value.trim()));
            }
        }

        for (symbol, operator) in [
            ("!=", Operator::Ne),
            ("=", Operator::Eq),
            (">", Operator::Gt),
            ("<", Operator::Lt),
        ] {
            if let Some((field, value)) = trimmed.split_once(symbol) {
                let field = field.trim();
                if field.is_empty() {
                    return Err(RuleParseError::EmptyField(s.to_string()));
                }
                return Ok(FilterRule::new(field, operator, value.trim()));
            }
        }

        Err(RuleParseError::MissingOperator(s.to_string()))
    }
}

impl FromStr for SortRule {
    type Err = RuleParseError;

    /// Parse `field`, `field:asc` or `field:desc`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.trim().rsplit_once(':') {
            Some((field, dir)) => {
                let direction = match dir.to_lowercase().as_str() {
                    "asc" => Direction::Asc,
                    "desc" => Direction::Desc,
                    _ => return Err(RuleParseError::UnknownDirection(dir.to_string())),
                };
                (field.trim(), direction)
            }
            None => (s.trim(), Direction::Asc),
        };
        if field.is_empty() {
            return Err(RuleParseError::EmptyField(s.to_string()));
        }
        Ok(SortRule {
            field: field.to_string(),
            direction,
        })
    }
}

/// A record field as seen by the query engine
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Missing,
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
}

impl FieldValue {
    fn from_opt(value: Option<&str>) -> Self {
        value.map_or(FieldValue::Missing, |v| FieldValue::Text(v.to_string()))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// String form used by `=`, `!=`, `regex` and lexical comparison
    pub fn stringify(&self) -> String {
        match self {
            FieldValue::Missing => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::List(items) => items.join(","),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => parse_number(s),
            _ => None,
        }
    }
}

/// Resolve a field name against a record
///
/// Unknown names fall through to the record's extra fields.
pub fn field_value(record: &Record, field: &str) -> FieldValue {
    match field {
        "id" => FieldValue::Text(record.id.clone()),
        "path" => FieldValue::Text(record.path.clone()),
        "line" => FieldValue::Number(record.line as f64),
        "title" => FieldValue::Text(record.title.clone()),
        "content" => FieldValue::Text(record.content.clone()),
        "kind" | "type" => FieldValue::Text(record.kind.as_str().to_string()),
        "status" => FieldValue::from_opt(record.status.as_deref()),
        "category" => FieldValue::Text(record.category.clone()),
        "tags" => FieldValue::List(record.tags.iter().cloned().collect()),
        "recurrence" | "recurrenceText" | "recurrence_text" => {
            FieldValue::Text(record.recurrence_text.clone())
        }
        "primaryDate" | "primary_date" | "date" => FieldValue::from_opt(record.primary_date.as_deref()),
        "created" => FieldValue::Number(record.created as f64),
        "modified" => FieldValue::Number(record.modified as f64),
        "header" => FieldValue::from_opt(record.header.as_deref()),
        "icon" => FieldValue::from_opt(record.icon.as_deref()),
        "priority" => FieldValue::from_opt(record.priority.map(|p| p.as_str())),
        "due" => FieldValue::from_opt(record.dates.due.as_deref()),
        "scheduled" => FieldValue::from_opt(record.dates.scheduled.as_deref()),
        "start" => FieldValue::from_opt(record.dates.start.as_deref()),
        "createdDate" | "created_date" => FieldValue::from_opt(record.dates.created.as_deref()),
        "done" | "doneDate" | "done_date" => FieldValue::from_opt(record.dates.done.as_deref()),
        "cancelled" | "cancelledDate" | "cancelled_date" => {
            FieldValue::from_opt(record.dates.cancelled.as_deref())
        }
        other => match record.extra.get(other) {
            Some(ExtraValue::Text(s)) => FieldValue::Text(s.clone()),
            Some(ExtraValue::Number(n)) => FieldValue::Number(*n),
            Some(ExtraValue::Bool(b)) => FieldValue::Bool(*b),
            None => FieldValue::Missing,
        },
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a date or timestamp into milliseconds since the epoch
fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(date) = crate::text::parse_date(s) {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// A filter rule ready for evaluation
#[derive(Debug)]
enum CompiledRule<'a> {
    Regex(&'a str, Regex),
    /// A rule whose pattern failed to compile; matches nothing
    Never,
    Plain(&'a FilterRule),
}

fn compile(rule: &FilterRule) -> CompiledRule<'_> {
    match rule.operator {
        Operator::Regex => match Regex::new(&rule.value) {
            Ok(re) => CompiledRule::Regex(&rule.field, re),
            Err(err) => {
                tracing::warn!("Invalid regex in filter on '{}': {}", rule.field, err);
                CompiledRule::Never
            }
        },
        _ => CompiledRule::Plain(rule),
    }
}

fn matches_rule(record: &Record, rule: &CompiledRule<'_>) -> bool {
    match rule {
        CompiledRule::Never => false,
        CompiledRule::Regex(field, re) => match field_value(record, field) {
            FieldValue::List(items) => items.iter().any(|item| re.is_match(item)),
            value => re.is_match(&value.stringify()),
        },
        CompiledRule::Plain(rule) => {
            let value = field_value(record, &rule.field);
            match rule.operator {
                Operator::Eq => value.stringify() == rule.value,
                Operator::Ne => value.stringify() != rule.value,
                Operator::Includes => match &value {
                    FieldValue::List(items) => items.iter().any(|item| item.contains(&rule.value)),
                    FieldValue::Missing => false,
                    other => other.stringify().contains(&rule.value),
                },
                Operator::Gt => compare_for_filter(&value, &rule.value) == Some(Ordering::Greater),
                Operator::Lt => compare_for_filter(&value, &rule.value) == Some(Ordering::Less),
                Operator::Regex => false,
            }
        }
    }
}

/// Numeric, then date, then lexical comparison
fn compare_for_filter(value: &FieldValue, target: &str) -> Option<Ordering> {
    if value.is_missing() {
        return None;
    }
    if let (Some(a), Some(b)) = (value.as_number(), parse_number(target)) {
        return a.partial_cmp(&b);
    }
    let text = value.stringify();
    if let (Some(a), Some(b)) = (parse_timestamp(&text), parse_timestamp(target)) {
        return Some(a.cmp(&b));
    }
    Some(text.as_str().cmp(target))
}

/// Keep the records satisfying every rule
pub fn filter_records<'r>(records: &'r [Record], rules: &[FilterRule]) -> Vec<&'r Record> {
    let compiled: Vec<CompiledRule<'_>> = rules.iter().map(compile).collect();
    records
        .iter()
        .filter(|record| compiled.iter().all(|rule| matches_rule(record, rule)))
        .collect()
}

/// Stable multi-key sort
///
/// Absent values go last when ascending and first when descending.
pub fn sort_records(records: &mut [&Record], rules: &[SortRule]) {
    if rules.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for rule in rules {
            let ordering = compare_for_sort(
                &sort_value(a, &rule.field),
                &sort_value(b, &rule.field),
                rule.direction,
            );
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Field value used for ordering; priorities order by rank, not by name
fn sort_value(record: &Record, field: &str) -> FieldValue {
    match field {
        "priority" => record
            .priority
            .map_or(FieldValue::Missing, |p| FieldValue::Number(f64::from(p.rank()))),
        _ => field_value(record, field),
    }
}

fn compare_for_sort(a: &FieldValue, b: &FieldValue, direction: Direction) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => return Ordering::Equal,
        (true, false) => {
            return match direction {
                Direction::Asc => Ordering::Greater,
                Direction::Desc => Ordering::Less,
            }
        }
        (false, true) => {
            return match direction {
                Direction::Asc => Ordering::Less,
                Direction::Desc => Ordering::Greater,
            }
        }
        (false, false) => {}
    }

    let ordering = match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => locale_compare(&a.stringify(), &b.stringify()),
    };

    match direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}

/// Case-folding comparison, ties broken by code point order
fn locale_compare(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Filter then sort, returning owned records
pub fn run_query(records: &[Record], filters: &[FilterRule], sort: &[SortRule]) -> Vec<Record> {
    let mut selected = filter_records(records, filters);
    sort_records(&mut selected, sort);
    selected.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_task_line, LineContext};

    fn task(line: &str, n: usize) -> Record {
        parse_task_line(
            line,
            LineContext {
                path: "t.md",
                folder: "",
                line: n,
            },
        )
        .unwrap()
    }

    fn sample() -> Vec<Record> {
        vec![
            task("- [ ] Write report #work 📅 2024-03-10 (effort:: 3)", 1),
            task("- [x] Call plumber #home ✅ 2024-03-02", 2),
            task("- [ ] buy stamps #home #errands", 3),
            task("- [-] Old plan #work ❌ 2024-01-01 (effort:: 10)", 4),
            task("- [ ] Apply visa 📅 2024-02-01 (effort:: 5)", 5),
        ]
    }

    fn ids(records: &[Record]) -> Vec<usize> {
        records.iter().map(|r| r.line).collect()
    }

    #[test]
    fn test_status_equality() {
        let records = sample();
        let result = run_query(&records, &[FilterRule::new("status", Operator::Eq, "done")], &[]);
        assert_eq!(ids(&result), vec![2]);
    }

    #[test]
    fn test_includes_on_tags() {
        let records = sample();
        let result = run_query(&records, &[FilterRule::new("tags", Operator::Includes, "home")], &[]);
        assert_eq!(ids(&result), vec![2, 3]);
    }

    #[test]
    fn test_numeric_and_date_comparison() {
        let records = sample();
        let result = run_query(&records, &[FilterRule::new("effort", Operator::Gt, "4")], &[]);
        assert_eq!(ids(&result), vec![4, 5]);

        let result = run_query(&records, &[FilterRule::new("due", Operator::Lt, "2024/03/01")], &[]);
        assert_eq!(ids(&result), vec![5]);
    }

    #[test]
    fn test_lexical_comparison_fallback() {
        let records = sample();
        let result = run_query(&records, &[FilterRule::new("title", Operator::Lt, "D")], &[]);
        assert_eq!(ids(&result), vec![2, 5]);

        let result = run_query(&records, &[FilterRule::new("title", Operator::Gt, "V")], &[]);
        assert_eq!(ids(&result), vec![1, 3]);
    }

    #[test]
    fn test_not_equal_keeps_missing_fields() {
        let records = sample();
        let result = run_query(&records, &[FilterRule::new("effort", Operator::Ne, "3")], &[]);
        assert_eq!(ids(&result), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_includes_on_text_field() {
        let records = sample();
        let result = run_query(&records, &[FilterRule::new("title", Operator::Includes, "pl")], &[]);
        assert_eq!(ids(&result), vec![2, 4, 5]);

        let result = run_query(&records, &[FilterRule::new("effort", Operator::Includes, "")], &[]);
        assert_eq!(ids(&result), vec![1, 4, 5]);
    }

    #[test]
    fn test_sort_by_priority_rank() {
        let records = vec![
            task("- [ ] a 🔽", 1),
            task("- [ ] b ⏫", 2),
            task("- [ ] c", 3),
            task("- [ ] d 🔺", 4),
            task("- [ ] e 🔼", 5),
            task("- [ ] f ⏬", 6),
        ];
        let asc = run_query(&records, &[], &[SortRule::asc("priority")]);
        assert_eq!(ids(&asc), vec![4, 2, 5, 1, 6, 3]);

        let desc = run_query(&records, &[], &[SortRule::desc("priority")]);
        assert_eq!(ids(&desc), vec![3, 6, 1, 5, 2, 4]);

        let high = run_query(&records, &[FilterRule::new("priority", Operator::Eq, "high")], &[]);
        assert_eq!(ids(&high), vec![2]);
    }

    #[test]
    fn test_invalid_regex_matches_nothing() {
        let records = sample();
        let result = run_query(&records, &[FilterRule::new("title", Operator::Regex, "(")], &[]);
        assert!(result.is_empty());

        let result = run_query(&records, &[FilterRule::new("tags", Operator::Regex, "^err")], &[]);
        assert_eq!(ids(&result), vec![3]);
    }

    #[test]
    fn test_sort_missing_values() {
        let records = sample();
        let asc = run_query(&records, &[], &[SortRule::asc("due")]);
        assert_eq!(ids(&asc), vec![5, 1, 2, 3, 4]);

        let desc = run_query(&records, &[], &[SortRule::desc("due")]);
        assert_eq!(ids(&desc), vec![2, 3, 4, 1, 5]);
    }

    #[test]
    fn test_multi_key_sort_and_case_folding() {
        let records = sample();
        let sorted = run_query(
            &records,
            &[],
            &[SortRule::asc("status"), SortRule::asc("title")],
        );
        assert_eq!(ids(&sorted), vec![4, 2, 5, 3, 1]);
    }

    #[test]
    fn test_parse_rules() {
        assert_eq!(
            "status=done".parse::<FilterRule>().unwrap(),
            FilterRule::new("status", Operator::Eq, "done")
        );
        assert_eq!(
            "status != open".parse::<FilterRule>().unwrap(),
            FilterRule::new("status", Operator::Ne, "open")
        );
        assert_eq!(
            "tags includes home".parse::<FilterRule>().unwrap(),
            FilterRule::new("tags", Operator::Includes, "home")
        );
        assert_eq!(
            "title regex ^Call .*".parse::<FilterRule>().unwrap(),
            FilterRule::new("title", Operator::Regex, "^Call .*")
        );
        assert!("nothing here".parse::<FilterRule>().is_err());
        assert_eq!("due:desc".parse::<SortRule>().unwrap(), SortRule::desc("due"));
        assert_eq!("title".parse::<SortRule>().unwrap(), SortRule::asc("title"));
        assert!("due:sideways".parse::<SortRule>().is_err());
    }
}
