//! Image manifests
//!
//! A manifest describes a memory image as TOML: target widths, segments
//! (file-backed or inline hex) placed at base addresses, and symbols.
//!
//! ```toml
//! pointer_size = 8
//!
//! [[segment]]
//! base = 0x1000
//! file = "heap.bin"
//!
//! [[segment]]
//! base = 0x9000
//! hex = "48656c6c6f00"
//!
//! [symbols]
//! main = 0x1000
//! ```
//!
//! Segment file paths are relative to the manifest.

use anyhow::{bail, Context, Result};
use remote_mirror::MemoryImage;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub pointer_size: u8,
    pub size_size: Option<u8>,
    pub max_string_length: Option<u64>,
    #[serde(default, rename = "segment")]
    pub segments: Vec<SegmentSpec>,
    #[serde(default)]
    pub symbols: BTreeMap<String, u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentSpec {
    pub base: u64,
    pub file: Option<PathBuf>,
    pub hex: Option<String>,
}

impl Manifest {
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse image manifest")
    }

    /// Build the image, resolving segment files against `root`
    pub fn build(&self, root: &Path) -> Result<MemoryImage> {
        let mut image = MemoryImage::new(self.pointer_size)?;
        if let Some(size_size) = self.size_size {
            image = image.with_size_size(size_size);
        }
        if let Some(max) = self.max_string_length {
            image = image.with_max_string_length(max);
        }

        for segment in &self.segments {
            match (&segment.file, &segment.hex) {
                (Some(file), None) => {
                    let path = root.join(file);
                    image.map_file(segment.base, &path).with_context(|| {
                        format!(
                            "Failed to map segment {} at {:#x}",
                            path.display(),
                            segment.base
                        )
                    })?;
                }
                (None, Some(hex)) => {
                    let bytes = hex::decode(hex.replace(char::is_whitespace, ""))
                        .with_context(|| format!("Invalid hex in segment at {:#x}", segment.base))?;
                    image
                        .add_segment(segment.base, bytes)
                        .with_context(|| format!("Invalid segment at {:#x}", segment.base))?;
                }
                _ => bail!(
                    "Segment at {:#x} must have exactly one of `file` or `hex`",
                    segment.base
                ),
            }
        }

        for (name, &address) in &self.symbols {
            image.define_symbol(name.as_str(), address);
        }

        debug!(
            segments = image.segments().len(),
            symbols = image.symbol_count(),
            "Built memory image"
        );

        Ok(image)
    }
}

/// Load a manifest file and build its image
pub fn load_image(path: &Path) -> Result<MemoryImage> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let manifest = Manifest::from_toml(&contents)
        .with_context(|| format!("Invalid manifest {}", path.display()))?;

    let root = path.parent().unwrap_or_else(|| Path::new("."));
    manifest.build(root)
}
