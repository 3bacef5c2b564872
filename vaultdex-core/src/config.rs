//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Main configuration struct matching the vaultdex.yml schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_vault")]
    pub vault: PathBuf,

    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    #[serde(default)]
    pub perf_log: Option<PathBuf>,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    #[serde(default)]
    pub blocks: BlocksConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub recurrence: RecurrenceConfig,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_vault() -> PathBuf {
    PathBuf::from(".")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".vaultdex/cache.json")
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}

/// Delimiter lines of multi-line record blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocksConfig {
    #[serde(default = "default_block_start")]
    pub start: String,

    #[serde(default = "default_block_end")]
    pub end: String,
}

fn default_block_start() -> String {
    String::from("```record")
}

fn default_block_end() -> String {
    String::from("```")
}

impl Default for BlocksConfig {
    fn default() -> Self {
        Self {
            start: default_block_start(),
            end: default_block_end(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_notify_throttle_ms")]
    pub notify_throttle_ms: u64,

    #[serde(default = "default_cache_debounce_ms")]
    pub cache_debounce_ms: u64,
}

fn default_notify_throttle_ms() -> u64 {
    250
}

fn default_cache_debounce_ms() -> u64 {
    1000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            notify_throttle_ms: default_notify_throttle_ms(),
            cache_debounce_ms: default_cache_debounce_ms(),
        }
    }
}

/// Where the next occurrence of a recurring task is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    #[default]
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecurrenceConfig {
    #[serde(default)]
    pub placement: Placement,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault: default_vault(),
            cache_path: default_cache_path(),
            perf_log: None,
            extensions: default_extensions(),
            ignore_patterns: Vec::new(),
            blocks: BlocksConfig::default(),
            timing: TimingConfig::default(),
            recurrence: RecurrenceConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Parse configuration from YAML text; relative paths stay unresolved
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.blocks.start.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "blocks.start".into(),
                reason: "delimiter must not be empty".into(),
            });
        }
        if self.blocks.end.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "blocks.end".into(),
                reason: "delimiter must not be empty".into(),
            });
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "extensions".into(),
                reason: "at least one extension is required".into(),
            });
        }
        Ok(())
    }

    /// Get the vault directory, resolved relative to config file
    pub fn vault_dir(&self) -> PathBuf {
        self.resolve_path(&self.vault)
    }

    /// Cache file location; relative paths are taken from the vault root
    pub fn cache_file(&self) -> PathBuf {
        if self.cache_path.is_absolute() {
            self.cache_path.clone()
        } else {
            self.vault_dir().join(&self.cache_path)
        }
    }

    /// Performance log location, if enabled
    pub fn perf_log_file(&self) -> Option<PathBuf> {
        self.perf_log.as_ref().map(|p| self.resolve_path(p))
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(config_path) = &self.config_path {
            if let Some(parent) = config_path.parent() {
                parent.join(path)
            } else {
                path.to_path_buf()
            }
        } else {
            path.to_path_buf()
        }
    }
}
