//! Encoders for each [`EncodePlan`] branch.
//!
//! | Plan | Encoder | Metadata |
//! |---|---|---|
//! | Png | `png` crate | `pHYs` from DPI, `tEXt` chunks |
//! | Jpeg | `image` JPEG encoder | JFIF density, EXIF `APP1` |
//! | Webp | `webp` (libwebp) | none |
//! | Avif | `image` AVIF encoder (rav1e), lossless plans at quality 100 | none |
//! | Tiff | `tiff` crate | `XResolution`/`YResolution` in inches |
//! | Other | `image::save_buffer_with_format` | none |
//!
//! Everything is written as 8-bit RGB. A DPI of 0 means "do not stamp".

use super::exif_tags::insert_exif_segment;
use super::params::EncodePlan;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const INCHES_PER_METRE: f64 = 0.0254;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{format} encoding failed: {reason}")]
    Encode { format: String, reason: String },
    /// No encoder for this format name; the caller falls back to PNG.
    #[error("no encoder for format: {0}")]
    Unsupported(String),
}

impl WriteError {
    fn encode(format: &str, reason: impl ToString) -> Self {
        WriteError::Encode {
            format: format.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the PNG fallback applies.
    pub fn wants_fallback(&self) -> bool {
        !matches!(self, WriteError::Io(_))
    }
}

/// Per-file metadata handed to the encoders.
#[derive(Debug, Default, Clone)]
pub struct WriteOptions<'a> {
    pub dpi: u32,
    /// TIFF-structured EXIF block for JPEG output; empty means none.
    pub exif: &'a [u8],
    /// `(keyword, text)` pairs for PNG `tEXt` chunks.
    pub text_chunks: Vec<(String, String)>,
    /// rav1e speed, 1 (slow) to 10 (fast).
    pub avif_speed: u8,
}

/// Encode `image` to `path` following `plan`.
pub fn write_image(
    path: &Path,
    image: &RgbImage,
    plan: &EncodePlan,
    opts: &WriteOptions<'_>,
) -> Result<(), WriteError> {
    match plan {
        EncodePlan::Png { compress_level } => write_png(path, image, *compress_level, opts),
        EncodePlan::Jpeg { quality } => write_jpeg(path, image, *quality, opts),
        EncodePlan::Webp { lossless, quality } => write_webp(path, image, *lossless, *quality),
        EncodePlan::Avif { quality, .. } => {
            let quality = if plan.is_lossless() {
                debug!(path = %path.display(), "AVIF encoder has no lossless mode, using quality 100");
                100
            } else {
                quality.unwrap_or(100)
            };
            write_avif(path, image, quality, opts.avif_speed)
        }
        EncodePlan::Tiff => write_tiff(path, image, opts.dpi),
        EncodePlan::Other { format, .. } => write_generic(path, image, format),
    }
}

fn png_compression(level: u8) -> png::Compression {
    match level {
        0..=2 => png::Compression::Fast,
        3..=6 => png::Compression::Default,
        _ => png::Compression::Best,
    }
}

pub fn write_png(
    path: &Path,
    image: &RgbImage,
    compress_level: u8,
    opts: &WriteOptions<'_>,
) -> Result<(), WriteError> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(file, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png_compression(compress_level));
    if opts.dpi > 0 {
        let ppm = (opts.dpi as f64 / INCHES_PER_METRE).round() as u32;
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: ppm,
            yppu: ppm,
            unit: png::Unit::Meter,
        }));
    }
    // tEXt is Latin-1 only; anything else goes into an iTXt chunk.
    for (keyword, text) in &opts.text_chunks {
        let added = if text.is_ascii() {
            encoder.add_text_chunk(keyword.clone(), text.clone())
        } else {
            encoder.add_itxt_chunk(keyword.clone(), text.clone())
        };
        added.map_err(|e| WriteError::encode("png", e))?;
    }
    let mut writer = encoder
        .write_header()
        .map_err(|e| WriteError::encode("png", e))?;
    writer
        .write_image_data(image.as_raw())
        .map_err(|e| WriteError::encode("png", e))?;
    writer.finish().map_err(|e| WriteError::encode("png", e))
}

/// JPEG at `quality` without chroma subsampling, EXIF spliced in after JFIF.
pub fn write_jpeg(
    path: &Path,
    image: &RgbImage,
    quality: u8,
    opts: &WriteOptions<'_>,
) -> Result<(), WriteError> {
    let mut encoded = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut encoded, quality.clamp(1, 100));
        if opts.dpi > 0 {
            encoder.set_pixel_density(PixelDensity::dpi(opts.dpi.min(u16::MAX as u32) as u16));
        }
        encoder
            .encode(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| WriteError::encode("jpeg", e))?;
    }

    let bytes = if opts.exif.is_empty() {
        encoded
    } else {
        match insert_exif_segment(&encoded, opts.exif) {
            Ok(with_exif) => with_exif,
            Err(reason) => {
                debug!(%reason, "writing JPEG without EXIF");
                encoded
            }
        }
    };
    std::fs::write(path, bytes)?;
    Ok(())
}

/// libwebp's default effort for lossless output without a quality.
const WEBP_LOSSLESS_EFFORT: f32 = 80.0;

pub fn write_webp(
    path: &Path,
    image: &RgbImage,
    lossless: bool,
    quality: Option<u8>,
) -> Result<(), WriteError> {
    let quality = quality.map_or(WEBP_LOSSLESS_EFFORT, |q| q as f32);
    let encoded = webp::Encoder::from_rgb(image.as_raw(), image.width(), image.height())
        .encode_simple(lossless, quality)
        .map_err(|e| WriteError::encode("webp", format!("{e:?}")))?;
    std::fs::write(path, &*encoded)?;
    Ok(())
}

/// AVIF through rav1e at `quality` 1-100.
///
/// rav1e has no lossless mode: a lossless plan is written at quality 100,
/// which keeps pixels within a few levels of the input but not exact.
pub fn write_avif(path: &Path, image: &RgbImage, quality: u8, speed: u8) -> Result<(), WriteError> {
    let file = BufWriter::new(File::create(path)?);
    let encoder = AvifEncoder::new_with_speed_quality(file, speed.clamp(1, 10), quality.clamp(1, 100));
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| WriteError::encode("avif", e))
}

pub fn write_tiff(path: &Path, image: &RgbImage, dpi: u32) -> Result<(), WriteError> {
    use tiff::encoder::{Rational, TiffEncoder, colortype};
    use tiff::tags::ResolutionUnit;

    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file).map_err(|e| WriteError::encode("tiff", e))?;
    let mut tiff_image = encoder
        .new_image::<colortype::RGB8>(image.width(), image.height())
        .map_err(|e| WriteError::encode("tiff", e))?;
    if dpi > 0 {
        tiff_image.resolution(ResolutionUnit::Inch, Rational { n: dpi, d: 1 });
    }
    tiff_image
        .write_data(image.as_raw())
        .map_err(|e| WriteError::encode("tiff", e))
}

/// Any other format the `image` crate can write, chosen by extension.
///
/// A failed attempt leaves no partial file behind.
pub fn write_generic(path: &Path, image: &RgbImage, format: &str) -> Result<(), WriteError> {
    let Some(image_format) = ImageFormat::from_extension(format).filter(|f| f.writing_enabled())
    else {
        return Err(WriteError::Unsupported(format.to_string()));
    };
    let result = image::save_buffer_with_format(
        path,
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
        image_format,
    );
    if let Err(e) = result {
        discard_partial(path);
        return Err(WriteError::encode(format, e));
    }
    Ok(())
}

fn discard_partial(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(cleanup) = std::fs::remove_file(path) {
        debug!(path = %path.display(), %cleanup, "could not remove partial output");
    }
}
