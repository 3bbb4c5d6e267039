//! Persistent rmirror defaults
//!
//! Holds the manifest used when `--manifest` is not given.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Absolute path of the default image manifest
    pub manifest: Option<PathBuf>,
}

impl Config {
    /// `<config_dir>/remote-mirror/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("remote-mirror");

        Ok(config_dir.join("config.toml"))
    }

    /// Read the user's config; a missing file reads as an empty config
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Read a config file; nothing is written when it is missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Write the user's config
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Write to `config_path`, creating parent directories as needed
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory at {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

        Ok(())
    }

    pub fn manifest(&self) -> Option<&Path> {
        self.manifest.as_deref()
    }

    pub fn set_manifest(&mut self, manifest: PathBuf) {
        self.manifest = Some(manifest);
    }
}
