// Configuration file handling

use crate::models::Category;
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, debug};

/// Settings read from `config.yml`
///
/// Every field is optional; a missing file means all defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the SQLite store
    pub store_path: Option<PathBuf>,
    /// Category given to new tasks when none is specified
    #[serde(deserialize_with = "strict_category")]
    pub default_category: Category,
    /// Where `export` writes backups
    pub export_dir: Option<PathBuf>,
    /// One of error, warn, info, debug, trace
    pub log_level: Option<String>,
}

/// Unlike stored snapshots, a config naming an unknown category is rejected
fn strict_category<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Category, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl Config {
    /// `<config dir>/taskbuddy/config.yml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskbuddy").join("config.yml"))
    }

    /// Load from an explicit path (which must exist) or the default location (which may not)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    /// Store directory: explicit override, then config, then `<data dir>/taskbuddy`
    pub fn resolve_store_path(&self, cli_override: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = cli_override.or_else(|| self.store_path.clone()) {
            return Ok(path);
        }
        dirs::data_dir()
            .map(|dir| dir.join("taskbuddy"))
            .ok_or_else(|| eyre!("Could not determine data directory; pass --store-path"))
    }

    /// Export directory: explicit override, then config, then the current directory
    pub fn resolve_export_dir(&self, cli_override: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = cli_override.or_else(|| self.export_dir.clone()) {
            return Ok(path);
        }
        std::env::current_dir().context("Could not determine current directory")
    }

    pub fn log_level(&self) -> Result<Option<Level>> {
        self.log_level
            .as_deref()
            .map(|level| {
                level
                    .parse::<Level>()
                    .map_err(|_| eyre!("Invalid log_level '{}' in config", level))
            })
            .transpose()
    }
}
