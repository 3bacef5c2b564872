//! Query command implementation.

use anyhow::Result;
use std::path::Path;
use vaultdex_core::{FilterRule, Record, SortRule};

use crate::context::{load_config, open_index, persist};

/// Options accepted by `vaultdex query`
pub struct QueryOptions {
    pub filters: Vec<FilterRule>,
    pub sort: Vec<SortRule>,
    pub limit: Option<usize>,
    pub json: bool,
}

pub fn query_records(config_path: &Path, opts: QueryOptions) -> Result<()> {
    let config = load_config(config_path)?;
    let (mut index, _) = open_index(&config)?;

    let results = index.query_items(&opts.filters, &opts.sort);
    tracing::debug!(matched = results.len(), memo = ?index.memo_stats(), "Query evaluated");
    let limit = opts.limit.unwrap_or(usize::MAX);
    let selected: Vec<&Record> = results.iter().take(limit).collect();

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
    } else if selected.is_empty() {
        println!("No matching records");
    } else {
        for record in &selected {
            println!("{}", format_line(record));
        }
    }

    persist(&mut index);
    Ok(())
}

fn format_line(record: &Record) -> String {
    let status = record.status.as_deref().unwrap_or("-");
    let mut line = format!("{:<10} {}  {}", status, record.id, record.title);
    if let Some(date) = &record.primary_date {
        line.push_str(&format!("  ({date})"));
    }
    if !record.tags.is_empty() {
        let tags: Vec<String> = record.tags.iter().map(|t| format!("#{t}")).collect();
        line.push_str(&format!("  {}", tags.join(" ")));
    }
    line
}
