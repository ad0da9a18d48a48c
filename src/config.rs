//! Node configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! serialized to a TOML table and the user's file is merged on top, so a
//! config file only needs the keys it wants to override.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! revision = "v2"               # Saver decision table: "v1" (legacy) or "v2"
//!
//! [paths]
//! input_dir = "input"           # Where image references are resolved
//! output_dir = "output"         # Where saved images land
//! temp_dir = "temp"             # Target of " [temp]" annotated references
//!
//! [loader]
//! # default_dpi = 96            # Omit to use the revision default (v1: 96, v2: 0)
//! excluded_stack_formats = ["mpo"]
//!
//! [saver]
//! png_compress_level = 4        # v2 PNG zlib level (0-9)
//! avif_default_quality = 80     # v2 AVIF quality for q=0, and its ceiling
//! webp_default_quality = 95     # v2 WebP quality for q=0
//! jpeg_default_quality = 95     # v2 JPEG quality for q=0
//! avif_speed = 6                # AVIF encoder speed (1 slowest - 10 fastest)
//! archive_dir = "PNG"           # Sub-directory for `always_save_png` copies
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::TableRevision;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Node configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Which revision of the saver's quality/format decision table applies.
    pub revision: TableRevision,
    /// Host directory layout.
    pub paths: PathsConfig,
    /// Image Loader settings.
    pub loader: LoaderConfig,
    /// Image Saver settings.
    pub saver: SaverConfig,
}

impl NodeConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.saver.png_compress_level > 9 {
            return Err(ConfigError::Validation(
                "saver.png_compress_level must be 0-9".into(),
            ));
        }
        for (key, value) in [
            ("avif_default_quality", self.saver.avif_default_quality),
            ("webp_default_quality", self.saver.webp_default_quality),
            ("jpeg_default_quality", self.saver.jpeg_default_quality),
        ] {
            if value == 0 || value > 100 {
                return Err(ConfigError::Validation(format!(
                    "saver.{key} must be 1-100"
                )));
            }
        }
        if !(1..=10).contains(&self.saver.avif_speed) {
            return Err(ConfigError::Validation(
                "saver.avif_speed must be 1-10".into(),
            ));
        }
        if self.saver.archive_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "saver.archive_dir must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// DPI reported when the container carries none.
    ///
    /// The legacy table assumed screen resolution; the current one reports 0
    /// ("unknown") unless the user pins a value.
    pub fn default_dpi(&self) -> u32 {
        self.loader.default_dpi.unwrap_or(match self.revision {
            TableRevision::V1 => 96,
            TableRevision::V2 => 0,
        })
    }
}

/// Host directory layout for [`crate::host::DirectoryHost`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            temp_dir: PathBuf::from("temp"),
        }
    }
}

/// Image Loader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Fixed DPI to report for files without resolution metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_dpi: Option<u32>,
    /// Container formats whose extra frames are never returned as a stack.
    /// MPO files carry a stereo/preview pair, not an animation.
    pub excluded_stack_formats: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            default_dpi: None,
            excluded_stack_formats: vec!["mpo".to_string()],
        }
    }
}

/// Image Saver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaverConfig {
    pub png_compress_level: u8,
    pub avif_default_quality: u8,
    pub webp_default_quality: u8,
    pub jpeg_default_quality: u8,
    /// AVIF encoder speed, 1 (slowest, smallest) to 10 (fastest).
    pub avif_speed: u8,
    /// Directory (relative to the output dir) for `always_save_png` copies.
    pub archive_dir: String,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            png_compress_level: 4,
            avif_default_quality: 80,
            webp_default_quality: 95,
            jpeg_default_quality: 95,
            avif_speed: 6,
            archive_dir: "PNG".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(NodeConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read `config.toml` from `dir` without deserializing into [`NodeConfig`].
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto `base`, deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<NodeConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: NodeConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the effective config for `dir`: stock defaults plus `dir/config.toml`.
pub fn load_config(dir: &Path) -> Result<NodeConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# image-with-info Configuration
# =============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Saver decision table revision.
#   "v1" - legacy: PNG level derived from quality, quality passed through,
#          batch items named <name>_<i>, existing files overwritten.
#   "v2" - current: configured PNG level, lossless at q=100, defaults at q=0,
#          numeric suffixes instead of overwriting, optional PNG archive copy.
revision = "v2"

# ---------------------------------------------------------------------------
# Host directories
# ---------------------------------------------------------------------------
[paths]
input_dir = "input"
output_dir = "output"
temp_dir = "temp"

# ---------------------------------------------------------------------------
# Image Loader
# ---------------------------------------------------------------------------
[loader]
# DPI reported when a file has no resolution metadata.
# Omit to use the revision default (v1: 96, v2: 0 = unknown).
# default_dpi = 96

# Containers whose extra frames are ignored (MPO stores a stereo pair).
excluded_stack_formats = ["mpo"]

# ---------------------------------------------------------------------------
# Image Saver
# ---------------------------------------------------------------------------
[saver]
# zlib level for PNG output under v2 (0 = fastest, 9 = smallest).
png_compress_level = 4

# AVIF quality used for q=0. Requested qualities above it are clamped down.
avif_default_quality = 80

# WebP quality used for q=0 (q=100 switches to lossless).
webp_default_quality = 95

# JPEG quality used for q=0.
jpeg_default_quality = 95

# AVIF encoder speed: 1 (slowest, smallest) to 10 (fastest).
avif_speed = 6

# Sub-directory of the output dir that receives `always_save_png` copies.
archive_dir = "PNG"
"##
}
