//! Scan command implementation.

use anyhow::Result;
use std::path::Path;

use crate::context::{load_config, open_index, persist};

/// Warm-start the index and write the cache
pub fn scan_vault(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let (mut index, report) = open_index(&config)?;
    persist(&mut index);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Indexed {} record(s) from {} document(s)",
            report.items,
            index.document_count()
        );
        println!(
            "  restored: {}  scanned: {}  removed: {}  failed: {}",
            report.restored, report.scanned, report.removed, report.failed
        );
    }
    Ok(())
}
