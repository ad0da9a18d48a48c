//! Frame decoding, normalization and mask derivation.
//!
//! | Step | Function |
//! |---|---|
//! | Decode every frame of a container | [`decode_frames`] |
//! | Transparency declared by a PNG header | [`png_alpha_source`] |
//! | Pixels → `[0,1]` RGB | [`to_rgb_frame`] |
//! | Where transparency comes from | [`classify_alpha`] |
//! | Alpha → inverted mask | [`derive_mask`] |
//! | Keep frames matching the first one's size | [`FrameCollector`] |
//!
//! Multi-frame containers are GIF, APNG, animated WebP and multi-page TIFF.
//! Animation frames come out of the `image` crate composited to full canvas
//! size as RGBA, so their transparency is read from the container instead of
//! the pixel format. TIFF pages keep their own size and layout.

use super::avif;
use crate::metadata::PngInfo;
use crate::types::{Frame, Mask, placeholder_mask};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::error::{DecodingError, ImageFormatHint};
use image::{
    AnimationDecoder, DynamicImage, Frames, ImageBuffer, ImageDecoder, ImageError, ImageFormat,
    ImageReader, ImageResult, Luma, Rgb, RgbImage,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Extensions the loader offers as inputs.
///
/// AVIF goes through our own decoder: `ImageFormat::reading_enabled()`
/// reports `true` for AVIF once the encoder feature is on, so it is listed
/// separately. MPO files are JPEG streams and decode as their first image.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("mpo", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("gif", ImageFormat::Gif),
    ("bmp", ImageFormat::Bmp),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut exts: Vec<&'static str> = INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect();
    exts.push("avif");
    exts
});

/// Image file extensions with a working decoder compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether `path`'s extension names a format the loader can read.
pub fn is_readable_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.iter().any(|s| *s == e)
        })
}

/// Container format sniffed from the file content, extension as fallback.
pub fn detect_format(path: &Path) -> Option<ImageFormat> {
    ImageReader::open(path)
        .ok()?
        .with_guessed_format()
        .ok()?
        .format()
}

fn open_buffered(path: &Path) -> ImageResult<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

/// Frames of one container, in container order.
#[derive(Debug)]
pub struct DecodedFrames {
    pub frames: Vec<DynamicImage>,
    /// Transparency as declared by the container, for decoders whose frames
    /// come out as RGBA whether or not the file has any.
    pub declared_alpha: Option<AlphaSource>,
}

impl DecodedFrames {
    fn single(image: DynamicImage) -> Self {
        Self {
            frames: vec![image],
            declared_alpha: None,
        }
    }
}

fn collect_frames(frames: Frames<'_>) -> ImageResult<Vec<DynamicImage>> {
    frames
        .map(|frame| frame.map(|f| DynamicImage::ImageRgba8(f.into_buffer())))
        .collect()
}

/// Decode all frames of the image at `path`.
///
/// GIF, APNG, animated WebP and multi-page TIFF yield every frame; other
/// containers exactly one.
pub fn decode_frames(path: &Path, format: Option<ImageFormat>) -> ImageResult<DecodedFrames> {
    match format {
        Some(ImageFormat::Gif) => {
            let declared = gif_alpha_source(path)?;
            let decoder = GifDecoder::new(open_buffered(path)?)?;
            Ok(DecodedFrames {
                frames: collect_frames(decoder.into_frames())?,
                declared_alpha: Some(declared),
            })
        }
        Some(ImageFormat::Png) => {
            let decoder = PngDecoder::new(open_buffered(path)?)?;
            if decoder.is_apng()? {
                Ok(DecodedFrames {
                    frames: collect_frames(decoder.apng()?.into_frames())?,
                    declared_alpha: None,
                })
            } else {
                Ok(DecodedFrames::single(DynamicImage::from_decoder(decoder)?))
            }
        }
        Some(ImageFormat::WebP) => {
            let decoder = WebPDecoder::new(open_buffered(path)?)?;
            if decoder.has_animation() {
                let declared = if decoder.color_type().has_alpha() {
                    AlphaSource::Channel
                } else {
                    AlphaSource::None
                };
                Ok(DecodedFrames {
                    frames: collect_frames(decoder.into_frames())?,
                    declared_alpha: Some(declared),
                })
            } else {
                Ok(DecodedFrames::single(DynamicImage::from_decoder(decoder)?))
            }
        }
        Some(ImageFormat::Tiff) => decode_tiff_pages(path),
        Some(ImageFormat::Avif) => {
            let rgb = avif::decode_avif(path)?;
            Ok(DecodedFrames::single(DynamicImage::ImageRgb8(rgb)))
        }
        _ => {
            let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
            Ok(DecodedFrames::single(image))
        }
    }
}

fn gif_error(e: gif::DecodingError) -> ImageError {
    ImageError::Decoding(DecodingError::new(
        ImageFormatHint::Exact(ImageFormat::Gif),
        e,
    ))
}

/// GIF frames are palette images: transparency exists only where a frame's
/// graphic control block names a transparent index.
fn gif_alpha_source(path: &Path) -> ImageResult<AlphaSource> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(open_buffered(path)?).map_err(gif_error)?;
    while let Some(frame) = decoder.read_next_frame().map_err(gif_error)? {
        if frame.transparent.is_some() {
            return Ok(AlphaSource::TransparencyKey);
        }
    }
    Ok(AlphaSource::None)
}

// =============================================================================
// TIFF pages
// =============================================================================

fn tiff_error(e: tiff::TiffError) -> ImageError {
    ImageError::Decoding(DecodingError::new(
        ImageFormatHint::Exact(ImageFormat::Tiff),
        e,
    ))
}

/// One TIFF page as a `DynamicImage`, for the sample layouts the `image`
/// crate also represents. `None` for anything else (CMYK, palette, float).
fn tiff_page(
    width: u32,
    height: u32,
    color: tiff::ColorType,
    data: tiff::decoder::DecodingResult,
) -> Option<DynamicImage> {
    use tiff::ColorType as C;
    use tiff::decoder::DecodingResult as D;

    match (color, data) {
        (C::Gray(8), D::U8(buf)) => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
        (C::GrayA(8), D::U8(buf)) => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8),
        (C::RGB(8), D::U8(buf)) => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
        (C::RGBA(8), D::U8(buf)) => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba8),
        (C::Gray(16), D::U16(buf)) => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma16),
        (C::GrayA(16), D::U16(buf)) => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA16),
        (C::RGB(16), D::U16(buf)) => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb16),
        (C::RGBA(16), D::U16(buf)) => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba16),
        _ => None,
    }
}

/// Every page (IFD) of a TIFF file.
///
/// When the first page uses a layout [`tiff_page`] does not cover, the file
/// is decoded by the `image` crate as a single image instead. Later pages in
/// such layouts are skipped.
fn decode_tiff_pages(path: &Path) -> ImageResult<DecodedFrames> {
    let mut decoder = tiff::decoder::Decoder::new(open_buffered(path)?).map_err(tiff_error)?;
    let mut frames = Vec::new();
    let mut index = 0usize;
    loop {
        let (width, height) = decoder.dimensions().map_err(tiff_error)?;
        let color = decoder.colortype().map_err(tiff_error)?;
        let data = decoder.read_image().map_err(tiff_error)?;
        match tiff_page(width, height, color, data) {
            Some(page) => frames.push(page),
            None if index == 0 => {
                let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
                return Ok(DecodedFrames::single(image));
            }
            None => debug!(index, ?color, "skipping TIFF page with unsupported layout"),
        }
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(tiff_error)?;
        index += 1;
    }
    Ok(DecodedFrames {
        frames,
        declared_alpha: None,
    })
}

/// 16-bit grayscale sample → `[0,1]`: scaled by 1/255, clipped to 8 bits.
fn wide_sample_to_unit(sample: u16) -> f32 {
    (sample as f32 / 255.0).floor().min(255.0) / 255.0
}

/// Convert a decoded frame to normalized RGB.
///
/// 16-bit grayscale is the "wide integer" pixel mode: its samples are divided
/// by 255 and clipped rather than rescaled from 16 bits. Everything else goes
/// through 8-bit RGB.
pub fn to_rgb_frame(image: &DynamicImage) -> Frame {
    match image {
        DynamicImage::ImageLuma16(buf) => Frame::from_fn(buf.width(), buf.height(), |x, y| {
            let v = wide_sample_to_unit(buf.get_pixel(x, y).0[0]);
            Rgb([v, v, v])
        }),
        DynamicImage::ImageLumaA16(buf) => Frame::from_fn(buf.width(), buf.height(), |x, y| {
            let v = wide_sample_to_unit(buf.get_pixel(x, y).0[0]);
            Rgb([v, v, v])
        }),
        other => {
            let rgb = other.to_rgb8();
            Frame::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                Rgb([r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0])
            })
        }
    }
}

/// Normalized frame → 8-bit RGB for encoding. Values are clipped, then
/// truncated.
pub fn frame_to_rgb8(frame: &Frame) -> RgbImage {
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0;
        let q = |v: f32| (v * 255.0).clamp(0.0, 255.0) as u8;
        Rgb([q(r), q(g), q(b)])
    })
}

/// Where a frame's transparency comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaSource {
    /// The pixel format carries an alpha channel.
    Channel,
    /// A palette image with a `tRNS` transparency key, expanded to RGBA.
    TransparencyKey,
    /// No transparency; the mask is the 64×64 placeholder.
    None,
}

/// Alpha source a PNG header declares.
///
/// A colour key (`tRNS`) on a truecolour or grayscale image is not treated as
/// alpha, even though the decoder expands it into one.
pub fn png_alpha_source(info: &PngInfo) -> AlphaSource {
    match info.color_type {
        png::ColorType::Rgba | png::ColorType::GrayscaleAlpha => AlphaSource::Channel,
        png::ColorType::Indexed if info.has_trns => AlphaSource::TransparencyKey,
        _ => AlphaSource::None,
    }
}

/// Decide the alpha source for a decoded frame: what the container declares
/// when known, otherwise whether the pixel format has an alpha channel.
pub fn classify_alpha(image: &DynamicImage, declared: Option<AlphaSource>) -> AlphaSource {
    match declared {
        Some(source) => source,
        None if image.color().has_alpha() => AlphaSource::Channel,
        None => AlphaSource::None,
    }
}

/// Inverted alpha mask: `1 − alpha`, so `1.0` marks a fully transparent pixel.
pub fn derive_mask(image: &DynamicImage, source: AlphaSource) -> Mask {
    if source == AlphaSource::None {
        return placeholder_mask();
    }
    let rgba = image.to_rgba32f();
    Mask::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([1.0 - rgba.get_pixel(x, y).0[3]])
    })
}

/// Accumulates frames, enforcing that all share the first frame's size.
#[derive(Debug, Default)]
pub struct FrameCollector {
    reference: Option<(u32, u32)>,
    frames: Vec<Frame>,
    masks: Vec<Mask>,
    skipped: usize,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `frame` unless its size differs from the first accepted frame.
    /// Returns whether it was accepted.
    pub fn push(&mut self, frame: Frame, mask: Mask) -> bool {
        let size = frame.dimensions();
        match self.reference {
            Some(reference) if reference != size => {
                debug!(
                    index = self.frames.len() + self.skipped,
                    width = size.0,
                    height = size.1,
                    expected_width = reference.0,
                    expected_height = reference.1,
                    "skipping frame with mismatched size"
                );
                self.skipped += 1;
                false
            }
            _ => {
                self.reference.get_or_insert(size);
                self.frames.push(frame);
                self.masks.push(mask);
                true
            }
        }
    }

    pub fn accepted(&self) -> usize {
        self.frames.len()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Frames and masks to return. With `stack == false` only the first
    /// frame is kept. `None` when nothing was accepted.
    pub fn finish(self, stack: bool) -> Option<(Vec<Frame>, Vec<Mask>)> {
        let (mut frames, mut masks) = (self.frames, self.masks);
        if frames.is_empty() {
            return None;
        }
        if !stack {
            frames.truncate(1);
            masks.truncate(1);
        }
        Some((frames, masks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, LumaA, Rgba, RgbaImage};

    fn solid_frame(w: u32, h: u32) -> Frame {
        Frame::from_pixel(w, h, Rgb([0.5, 0.5, 0.5]))
    }

    #[test]
    fn supported_extensions_include_all_read_formats() {
        let exts = supported_input_extensions();
        for expected in ["jpg", "jpeg", "png", "tif", "tiff", "webp", "gif", "bmp", "avif"] {
            assert!(exts.contains(&expected), "expected {expected}");
        }
        assert!(is_readable_image(Path::new("a/B.PNG")));
        assert!(!is_readable_image(Path::new("notes.txt")));
        assert!(!is_readable_image(Path::new("noext")));
    }

    #[test]
    fn eight_bit_frames_normalize_by_255() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 51])));
        let frame = to_rgb_frame(&img);
        assert_eq!(frame.get_pixel(1, 1).0, [1.0, 0.0, 0.2]);
    }

    #[test]
    fn grayscale_expands_to_rgb() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([102])));
        assert_eq!(to_rgb_frame(&img).get_pixel(0, 0).0, [0.4, 0.4, 0.4]);
    }

    #[test]
    fn wide_grayscale_is_scaled_and_clipped() {
        let buf: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(3, 1, |x, _| Luma([[510u16, 300, 65535][x as usize]]));
        let frame = to_rgb_frame(&DynamicImage::ImageLuma16(buf));
        assert_eq!(frame.get_pixel(0, 0).0[0], 2.0 / 255.0);
        assert_eq!(frame.get_pixel(1, 0).0[0], 1.0 / 255.0);
        assert_eq!(frame.get_pixel(2, 0).0[0], 1.0);
    }

    #[test]
    fn rgb8_conversion_truncates_and_clips() {
        let frame = Frame::from_fn(3, 1, |x, _| Rgb([[1.5f32, -0.2, 0.999][x as usize]; 3]));
        let rgb = frame_to_rgb8(&frame);
        assert_eq!(rgb.get_pixel(0, 0).0, [255; 3]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0; 3]);
        assert_eq!(rgb.get_pixel(2, 0).0, [254; 3]);
    }

    #[test]
    fn opaque_rgba_gives_full_size_zero_mask() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(5, 3, Rgba([9, 9, 9, 255])));
        let source = classify_alpha(&img, None);
        assert_eq!(source, AlphaSource::Channel);
        let mask = derive_mask(&img, source);
        assert_eq!(mask.dimensions(), (5, 3));
        assert!(mask.pixels().all(|p| p.0[0] == 0.0));
    }

    #[test]
    fn mask_inverts_alpha() {
        let buf: ImageBuffer<LumaA<u8>, Vec<u8>> =
            ImageBuffer::from_fn(2, 1, |x, _| LumaA([0, if x == 0 { 0 } else { 255 }]));
        let img = DynamicImage::ImageLumaA8(buf);
        let mask = derive_mask(&img, classify_alpha(&img, None));
        assert_eq!(mask.get_pixel(0, 0).0[0], 1.0);
        assert_eq!(mask.get_pixel(1, 0).0[0], 0.0);
    }

    #[test]
    fn rgb_gives_placeholder_mask() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 7));
        let source = classify_alpha(&img, None);
        assert_eq!(source, AlphaSource::None);
        assert_eq!(derive_mask(&img, source).dimensions(), (64, 64));
    }

    #[test]
    fn png_header_decides_alpha() {
        let info = |color_type, has_trns| PngInfo {
            color_type,
            has_trns,
            pixel_dims: None,
        };
        assert_eq!(
            png_alpha_source(&info(png::ColorType::Indexed, true)),
            AlphaSource::TransparencyKey
        );
        assert_eq!(png_alpha_source(&info(png::ColorType::Indexed, false)), AlphaSource::None);
        assert_eq!(png_alpha_source(&info(png::ColorType::Rgb, true)), AlphaSource::None);
        assert_eq!(png_alpha_source(&info(png::ColorType::Rgba, false)), AlphaSource::Channel);
        assert_eq!(
            png_alpha_source(&info(png::ColorType::GrayscaleAlpha, false)),
            AlphaSource::Channel
        );
    }

    #[test]
    fn declared_alpha_overrides_pixel_format() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        assert_eq!(classify_alpha(&rgba, Some(AlphaSource::None)), AlphaSource::None);
        assert_eq!(
            derive_mask(&rgba, classify_alpha(&rgba, Some(AlphaSource::None))).dimensions(),
            (64, 64)
        );
    }

    #[test]
    fn opaque_gif_declares_no_alpha() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("anim.gif");
        crate::test_helpers::create_test_gif(&path, &[(6, 4), (6, 4)]);
        let decoded = decode_frames(&path, Some(ImageFormat::Gif)).unwrap();
        assert_eq!(decoded.frames.len(), 2);
        assert_eq!(decoded.declared_alpha, Some(AlphaSource::None));
    }

    #[test]
    fn transparent_gif_declares_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("clear.gif");
        crate::test_helpers::create_test_transparent_gif(&path, 6, 4);
        let decoded = decode_frames(&path, Some(ImageFormat::Gif)).unwrap();
        assert_eq!(decoded.declared_alpha, Some(AlphaSource::TransparencyKey));
    }

    #[test]
    fn tiff_pages_decode_in_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("pages.tif");
        crate::test_helpers::create_test_tiff(&path, &[(4, 4), (4, 4), (2, 3)]);
        let decoded = decode_frames(&path, Some(ImageFormat::Tiff)).unwrap();
        let sizes: Vec<_> = decoded.frames.iter().map(|f| (f.width(), f.height())).collect();
        assert_eq!(sizes, [(4, 4), (4, 4), (2, 3)]);
        assert_eq!(decoded.declared_alpha, None);
    }

    #[test]
    fn collector_drops_mismatched_frames() {
        let mut collector = FrameCollector::new();
        assert!(collector.push(solid_frame(4, 4), placeholder_mask()));
        assert!(!collector.push(solid_frame(8, 4), placeholder_mask()));
        assert!(collector.push(solid_frame(4, 4), placeholder_mask()));
        assert_eq!(collector.accepted(), 2);
        assert_eq!(collector.skipped(), 1);

        let (frames, masks) = collector.finish(true).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(masks.len(), 2);
    }

    #[test]
    fn collector_with_second_frame_different_returns_one() {
        let mut collector = FrameCollector::new();
        collector.push(solid_frame(4, 4), placeholder_mask());
        collector.push(solid_frame(2, 2), placeholder_mask());
        let (frames, _) = collector.finish(true).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn collector_without_stacking_keeps_first() {
        let mut collector = FrameCollector::new();
        collector.push(Frame::from_pixel(2, 2, Rgb([1.0, 0.0, 0.0])), placeholder_mask());
        collector.push(solid_frame(2, 2), placeholder_mask());
        let (frames, masks) = collector.finish(false).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(masks.len(), 1);
        assert_eq!(frames[0].get_pixel(0, 0).0, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_collector_finishes_with_none() {
        assert!(FrameCollector::new().finish(true).is_none());
    }
}
