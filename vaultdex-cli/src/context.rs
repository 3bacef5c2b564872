//! Shared setup for commands that open the index.

use anyhow::{bail, Context, Result};
use std::path::Path;
use vaultdex_core::Config;
use vaultdex_index::{FsVault, Index, IndexOptions, WarmStartReport};

/// Load the configuration file, pointing at `vaultdex init` when it is missing
pub fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        bail!(
            "No configuration at {:?}; run `vaultdex init` first or pass --config",
            config_path
        );
    }
    Config::from_file(config_path).context("Failed to load configuration")
}

/// Open and warm-start the index described by the configuration
pub fn open_index(config: &Config) -> Result<(Index<FsVault>, WarmStartReport)> {
    let vault_dir = config.vault_dir();
    if !vault_dir.is_dir() {
        bail!("Vault directory {:?} does not exist", vault_dir);
    }

    let mut index = Index::new(FsVault::from_config(config), IndexOptions::from_config(config));
    let report = index
        .warm_start()
        .with_context(|| format!("Failed to index {:?}", vault_dir))?;
    tracing::debug!(metrics = ?index.scan_metrics(), "Index opened");
    Ok((index, report))
}

/// Persist the cache before the process exits
///
/// A failed write only costs the next run a rescan, so it is logged and the
/// command still succeeds.
pub fn persist(index: &mut Index<FsVault>) {
    if let Err(err) = index.flush_cache() {
        tracing::warn!("Failed to write cache: {}", err);
    }
}
