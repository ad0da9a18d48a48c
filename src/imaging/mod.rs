//! Image processing: pure Rust apart from libwebp.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode frames** | `image` decoders; AVIF via `avif-parse` + `rav1d` |
//! | **Orientation** | `DynamicImage` flips/rotations |
//! | **EXIF name ↔ tag** | [`TAG_TABLE`] over `kamadak-exif` |
//! | **Encode** | `png`, `image` (JPEG, AVIF), `webp`, `tiff` |
//!
//! The module is split into:
//! - **Calculations**: the save decision table and file naming (unit testable)
//! - **Parameters**: data structures describing an encode
//! - **Frames**: decoding, normalization and masks
//! - **Writers**: one encoder per [`EncodePlan`] branch

pub mod avif;
mod calculations;
pub mod exif_tags;
pub mod frames;
pub mod orientation;
mod params;
pub mod writers;

pub use calculations::{
    base_filename, legacy_fallback_filename, legacy_frame_filename, plan, png_level,
    png_level_from_quality,
};
pub use exif_tags::{TAG_TABLE, build_exif_block, field_to_string};
pub use frames::{detect_format, is_readable_image, supported_input_extensions};
pub use orientation::apply_orientation;
pub use params::{EncodePlan, Encoding, Quality, TableRevision};
pub use writers::{WriteError, WriteOptions, write_image};
