//! Persistent options for opening disc images.
//!
//! Options live in the `[image]` table of
//! `~/.config/xapatch/settings.toml`. Other tables in that file are left
//! alone when options are saved.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xapatch_core::CdError;

/// Options controlling how an image is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    /// Stop reading trailing free space at the first sector that doesn't
    /// parse, instead of failing. Useful for images with junk appended.
    pub ignore_invalid: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    image: ImageOptions,
}

/// Canonical path to the settings file: `~/.config/xapatch/settings.toml`.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("xapatch").join("settings.toml")
}

/// Load image options from the settings file, falling back to defaults if
/// it is missing or unreadable.
pub fn load_options() -> ImageOptions {
    let path = settings_path();
    if !path.exists() {
        return ImageOptions::default();
    }
    match load_options_from(&path) {
        Ok(options) => options,
        Err(e) => {
            log::warn!("Ignoring settings in {}: {e}", path.display());
            ImageOptions::default()
        }
    }
}

pub fn load_options_from(path: &Path) -> Result<ImageOptions, CdError> {
    let contents = std::fs::read_to_string(path)?;
    let settings: SettingsFile = toml::from_str(&contents)
        .map_err(|e| CdError::config(format!("{}: {e}", path.display())))?;
    Ok(settings.image)
}

pub fn save_options(options: &ImageOptions) -> Result<(), CdError> {
    save_options_to(&settings_path(), options)
}

/// Write `options` into the `[image]` table of the settings file at `path`.
pub fn save_options_to(path: &Path, options: &ImageOptions) -> Result<(), CdError> {
    let mut doc: toml::Value = match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .parse()
            .unwrap_or_else(|_| toml::Value::Table(Default::default())),
        Err(_) => toml::Value::Table(Default::default()),
    };

    let table = doc
        .as_table_mut()
        .ok_or_else(|| CdError::config("settings.toml root is not a table"))?;
    let toml::Value::Table(fields) =
        toml::Value::try_from(options).map_err(|e| CdError::config(e.to_string()))?
    else {
        return Err(CdError::config("image options did not serialize to a table"));
    };
    // Merge into an existing [image] table so unknown keys survive.
    match table.get_mut("image") {
        Some(toml::Value::Table(existing)) => existing.extend(fields),
        _ => {
            table.insert("image".to_string(), toml::Value::Table(fields));
        }
    }

    // Write atomically
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(&doc).map_err(|e| CdError::config(e.to_string()))?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, &serialized)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
