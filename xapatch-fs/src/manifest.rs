//! TOML patch manifests.
//!
//! A manifest lists the files to replace inside an image:
//!
//! ```toml
//! [[patch]]
//! path = "cdrom:\\DATA\\BIG.BIN;1"
//! file = "build/big.bin"
//!
//! [[patch]]
//! path = "\\MOVIE.STR"
//! file = "movie.raw"
//! raw = true
//! ```
//!
//! Relative `file` paths are resolved against the manifest's directory.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xapatch_core::CdError;

use crate::image::Patch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path of the file inside the image.
    pub path: String,
    /// Replacement content on the host filesystem.
    pub file: PathBuf,
    /// Whether `file` holds whole raw sectors rather than plain data.
    #[serde(default)]
    pub raw: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchManifest {
    #[serde(default, rename = "patch")]
    pub patches: Vec<ManifestEntry>,
}

impl FromStr for PatchManifest {
    type Err = CdError;

    fn from_str(s: &str) -> Result<Self, CdError> {
        toml::from_str(s).map_err(|e| CdError::config(format!("Invalid patch manifest: {e}")))
    }
}

impl PatchManifest {
    pub fn load(path: &Path) -> Result<Self, CdError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CdError::config(format!("Failed to read {}: {e}", path.display())))?;
        contents.parse()
    }

    /// Read every replacement file, producing patches ready to apply.
    pub fn into_patches(self, base_dir: &Path) -> Result<Vec<Patch>, CdError> {
        self.patches
            .into_iter()
            .map(|entry| {
                let file = if entry.file.is_absolute() {
                    entry.file
                } else {
                    base_dir.join(entry.file)
                };
                let data = std::fs::read(&file).map_err(|e| {
                    CdError::config(format!("Failed to read {}: {e}", file.display()))
                })?;
                log::debug!("Loaded {} bytes for {}", data.len(), entry.path);
                Ok(if entry.raw {
                    Patch::raw(entry.path, data)
                } else {
                    Patch::data(entry.path, data)
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/manifest_tests.rs"]
mod tests;
