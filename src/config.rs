//! Configuration loading
//!
//! Handles parsing of `config.toml` in the data directory (`$HOME/.taskflow/`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::layout::Grid;

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_STORE_FILE: &str = "tasks.json";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Where the task store lives
    #[serde(default)]
    pub storage: StorageConfig,

    /// Canvas geometry
    #[serde(default)]
    pub layout: Grid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Path of the JSON store; relative paths resolve against the data directory
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the store path: an explicit path wins, then the config, then the default.
    pub fn store_path(&self, data_dir: &Path, explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        match &self.storage.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => data_dir.join(p),
            None => data_dir.join(DEFAULT_STORE_FILE),
        }
    }
}

/// The per-user data directory, `$HOME/.taskflow`.
pub fn data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".taskflow")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.layout.size, 20.0);
        assert_eq!(
            config.store_path(dir.path(), None),
            dir.path().join(DEFAULT_STORE_FILE)
        );
    }

    #[test]
    fn test_overrides_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
[storage]
path = "work.json"

[layout]
size = 10.0
node_width = 160.0
max_attempts = 5
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.layout.size, 10.0);
        assert_eq!(config.layout.node_width, 160.0);
        assert_eq!(config.layout.max_attempts, 5);
        // Unset keys keep their defaults.
        assert_eq!(config.layout.node_height, 80.0);
        assert_eq!(config.store_path(dir.path(), None), dir.path().join("work.json"));
        let explicit = dir.path().join("other.json");
        assert_eq!(config.store_path(dir.path(), Some(&explicit)), explicit);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[layout]\nsize = \"big\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config { .. })));
    }
}
