//! Task mutation commands.

use anyhow::{Context, Result};
use std::path::Path;
use vaultdex_core::TimeUpdate;

use crate::context::{load_config, open_index, persist};

/// Mark an open task done
pub fn complete_task(config_path: &Path, id: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let (mut index, _) = open_index(&config)?;

    let completion = index
        .complete_task(id)
        .with_context(|| format!("Failed to complete {id}"))?;
    persist(&mut index);

    println!("{}", completion.done_line.trim());
    if let Some(next) = &completion.next_line {
        println!("Next: {}", next.trim());
    }
    Ok(())
}

/// Set the time tokens of a task
pub fn set_task_time(
    config_path: &Path,
    id: &str,
    time: Option<String>,
    end_time: Option<String>,
    duration: Option<String>,
) -> Result<()> {
    let update = TimeUpdate {
        time,
        end_time,
        duration,
    };
    if update.is_empty() {
        anyhow::bail!("Nothing to set: pass --time, --end-time or --duration");
    }

    let config = load_config(config_path)?;
    let (mut index, _) = open_index(&config)?;

    index
        .update_task_time(id, &update)
        .with_context(|| format!("Failed to update {id}"))?;
    persist(&mut index);

    if let Some(record) = index.record(id) {
        println!("{}", record.content.trim());
    }
    Ok(())
}
