//! `rmirror configure`
//!
//! Stores or prints the default image manifest.

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Print the config when `show` is set, otherwise store `manifest` as the
/// default. With neither, print usage.
pub fn handle(manifest: Option<PathBuf>, show: bool) -> Result<()> {
    let config_path = Config::config_path()?;
    let mut config = Config::load_from(&config_path)?;

    if show {
        show_config(&config, &config_path);
        return Ok(());
    }

    if let Some(path) = manifest {
        set_manifest(&mut config, path, &config_path)?;
    } else {
        show_usage();
    }

    Ok(())
}

/// Print the default manifest and where the config file lives
fn show_config(config: &Config, config_path: &Path) {
    if let Some(path) = config.manifest() {
        println!("Default manifest: {}", path.display());
    } else {
        println!("No default manifest configured");
    }

    println!("Config file: {}", config_path.display());
}

/// Set the default manifest, stored as an absolute path
fn set_manifest(config: &mut Config, path: PathBuf, config_path: &Path) -> Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Manifest not found: {}", path.display()))?;

    config.set_manifest(path.clone());
    config.save_to(config_path)?;

    println!("Default manifest configured: {}", path.display());
    println!("Config saved to: {}", config_path.display());

    Ok(())
}

fn show_usage() {
    println!("Usage: rmirror configure --default-manifest IMAGE.toml");
    println!("       rmirror configure --show");
}
