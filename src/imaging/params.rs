//! Parameter types for save operations.
//!
//! These types describe *what* to write, not *how*. The decision table in
//! [`plan`](super::plan) turns a requested encoding and quality into an
//! [`EncodePlan`], and the [`writers`](super::writers) execute it. Keeping the
//! plan a plain value means the table can be tested without encoding a pixel.
//!
//! ## Types
//!
//! - [`Quality`] — Requested quality (0–100). Clamped on construction; 0 and 100 carry meaning.
//! - [`TableRevision`] — Which generation of the decision table applies.
//! - [`Encoding`] — Normalized target encoding name (aliases folded).
//! - [`EncodePlan`] — Fully resolved encoder settings for one file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested save quality (0-100).
///
/// Unlike an encoder quality this keeps 0: the current table reads it as
/// "use the format default", and 100 as "lossless where available".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.min(100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(100)
    }
}

/// Revision of the quality/format decision table.
///
/// `V1` reproduces the legacy saver byte for byte in its naming and level
/// choices; `V2` is the current behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableRevision {
    V1,
    #[default]
    V2,
}

impl fmt::Display for TableRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableRevision::V1 => write!(f, "v1"),
            TableRevision::V2 => write!(f, "v2"),
        }
    }
}

impl std::str::FromStr for TableRevision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" => Ok(TableRevision::V1),
            "v2" => Ok(TableRevision::V2),
            other => Err(format!("unknown table revision: {other} (expected v1 or v2)")),
        }
    }
}

/// Target encoding after name normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    Png,
    Jpeg,
    Webp,
    Avif,
    Tiff,
    /// Anything else: handed to the generic encoder by name.
    Other(String),
}

impl Encoding {
    /// Fold a user/loader supplied format name into an [`Encoding`].
    ///
    /// Case-insensitive; `jpeg` → `jpg`, `tif` → `tiff`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "png" => Encoding::Png,
            "jpg" | "jpeg" => Encoding::Jpeg,
            "webp" => Encoding::Webp,
            "avif" => Encoding::Avif,
            "tiff" | "tif" => Encoding::Tiff,
            other => Encoding::Other(other.to_string()),
        }
    }
}

/// Resolved encoder settings for one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodePlan {
    /// zlib compression level 0-9; PNG is always lossless.
    Png { compress_level: u8 },
    /// JPEG at `quality`, 4:4:4, EXIF re-attached.
    Jpeg { quality: u8 },
    /// `quality` is `None` exactly when the encoder picks its own lossless effort.
    Webp { lossless: bool, quality: Option<u8> },
    Avif { lossless: bool, quality: Option<u8> },
    /// Default TIFF codec with resolution tags.
    Tiff,
    /// Generic encoder chosen by extension; PNG fallback on failure.
    Other { format: String, quality: u8 },
}

impl EncodePlan {
    pub fn is_lossless(&self) -> bool {
        match self {
            EncodePlan::Png { .. } | EncodePlan::Tiff => true,
            EncodePlan::Webp { lossless, .. } | EncodePlan::Avif { lossless, .. } => *lossless,
            EncodePlan::Jpeg { .. } | EncodePlan::Other { .. } => false,
        }
    }
}
