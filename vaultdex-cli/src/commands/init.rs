//! Init command implementation.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

const DEFAULT_CONFIG: &str = include_str!("../../../vaultdex.yml.example");

/// Initialize a new vaultdex project
pub fn init_project(path: Option<&Path>) -> Result<()> {
    let root = path.unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(root).with_context(|| format!("Failed to create {:?}", root))?;

    write_config(root)?;
    scaffold_vault(root)?;

    println!("✓ vaultdex initialized in {:?}", root);
    println!("  - Edit vaultdex.yml to point at your notes");
    println!("  - Run `vaultdex scan` to build the index");
    Ok(())
}

fn write_config(root: &Path) -> Result<()> {
    let config_path = root.join("vaultdex.yml");
    if config_path.exists() {
        println!("vaultdex.yml already exists at {:?}", config_path);
        return Ok(());
    }

    fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {:?}", config_path))?;
    println!("Created {:?}", config_path);
    Ok(())
}

fn scaffold_vault(root: &Path) -> Result<()> {
    let vault_root = root.join("vault");
    fs::create_dir_all(&vault_root).with_context(|| format!("Failed to create {:?}", vault_root))?;

    // Starter document
    let sample = vault_root.join("inbox.md");
    if !sample.exists() {
        fs::write(&sample, sample_document())?;
        println!("Created {:?}", sample);
    }

    Ok(())
}

fn sample_document() -> &'static str {
    r#"# Inbox #triage

- [ ] Read the vaultdex README 📅 2025-01-10
- [ ] Water the plants 🔁 every 3 days 📅 2025-01-08
- [x] Install vaultdex ✅ 2025-01-01

```record
category:: journal
date:: 2025-01-01
First entry of the year.
```
"#
}
