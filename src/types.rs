//! Shared types passed between the loader, the saver and the host.
//!
//! Pixel data stays in `image` crate buffers: a frame is an
//! [`image::Rgb32FImage`] with samples in `[0, 1]`, a mask a single `f32`
//! channel. Both are row-major, so `frame.dimensions()` is `(width, height)`.

use image::{ImageBuffer, Luma, Rgb32FImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One decoded RGB frame, samples in `[0, 1]`.
pub type Frame = Rgb32FImage;

/// Single-channel transparency mask. `1.0` = fully transparent.
pub type Mask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Side length of the mask returned for images without transparency.
pub const PLACEHOLDER_MASK_SIZE: u32 = 64;

/// The all-zero 64×64 mask used when an image carries no transparency.
pub fn placeholder_mask() -> Mask {
    Mask::new(PLACEHOLDER_MASK_SIZE, PLACEHOLDER_MASK_SIZE)
}

/// Outcome of a best-effort metadata read.
///
/// Lets callers (and tests) tell "the file has no such field" apart from
/// "the field is there but unreadable"; both fall back to a default.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum MetadataProbe<T> {
    Present(T),
    Absent,
    Malformed(String),
}

impl<T> MetadataProbe<T> {
    pub fn present(self) -> Option<T> {
        match self {
            MetadataProbe::Present(v) => Some(v),
            _ => None,
        }
    }

    /// The probed value, or `default` when absent or malformed.
    pub fn value_or(self, default: T) -> T {
        self.present().unwrap_or(default)
    }
}

/// File-level metadata reported alongside the pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Basename without extension.
    pub filename: String,
    /// Lowercase extension, `"png"` when there is none.
    pub format: String,
    pub dpi: u32,
    /// Primary image size before orientation correction.
    pub width: u32,
    pub height: u32,
    pub long_edge: u32,
    pub short_edge: u32,
    pub file_size: u64,
    /// Known EXIF tags by name.
    pub exif: BTreeMap<String, String>,
}

impl ImageMetadata {
    /// EXIF JSON to embed when re-saving the loaded frames. `Orientation` is
    /// left out: the frames were already rotated upright.
    pub fn upright_exif_json(&self) -> String {
        let mut exif = self.exif.clone();
        exif.remove("Orientation");
        serde_json::to_string(&exif).unwrap_or_else(|_| "{}".to_string())
    }
}

/// How each metadata probe turned out for one load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataDiagnostics {
    pub dpi: MetadataProbe<u32>,
    /// Number of EXIF fields extracted.
    pub exif: MetadataProbe<usize>,
}

/// Everything the loader produces for one image reference.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// One or more frames of identical size; never empty.
    pub frames: Vec<Frame>,
    /// One mask per frame.
    pub masks: Vec<Mask>,
    pub metadata: ImageMetadata,
    pub diagnostics: MetadataDiagnostics,
}

impl LoadedImage {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
