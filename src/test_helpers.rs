//! Synthetic image fixtures for unit tests.
//!
//! Every helper writes a small generated image to `path` and panics on
//! failure; tests own the temp directory.

use crate::imaging::build_exif_block;
use crate::imaging::exif_tags::insert_exif_segment;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::{
    Delay, ExtendedColorType, Frame as AnimationFrame, ImageBuffer, ImageEncoder, Luma, Rgb,
    RgbImage, Rgba, RgbaImage,
};
use std::collections::BTreeMap;
use tiff::encoder::{TiffEncoder, colortype};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

pub fn create_test_png(path: &Path, width: u32, height: u32) {
    gradient(width, height).save(path).unwrap();
}

/// RGBA PNG where every pixel has the given alpha.
pub fn create_test_rgba_png(path: &Path, width: u32, height: u32, alpha: u8) {
    RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, alpha]))
        .save(path)
        .unwrap();
}

/// 16-bit grayscale PNG filled with `value`.
pub fn create_test_gray16_png(path: &Path, width: u32, height: u32, value: u16) {
    let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(width, height, Luma([value]));
    img.save(path).unwrap();
}

pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = gradient(width, height);
    let writer = BufWriter::new(File::create(path).unwrap());
    JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
}

pub fn create_test_jpeg_with_dpi(path: &Path, width: u32, height: u32, dpi: u16) {
    let img = gradient(width, height);
    let writer = BufWriter::new(File::create(path).unwrap());
    let mut encoder = JpegEncoder::new(writer);
    encoder.set_pixel_density(PixelDensity::dpi(dpi));
    encoder
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
}

/// JPEG carrying the given EXIF fields (tag name → value text).
pub fn create_test_jpeg_with_exif(path: &Path, width: u32, height: u32, exif: &[(&str, &str)]) {
    let img = gradient(width, height);
    let mut jpeg = Vec::new();
    JpegEncoder::new(&mut jpeg)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    let entries: BTreeMap<String, String> = exif
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let block = build_exif_block(&entries);
    assert!(block.dropped.is_empty(), "fixture EXIF dropped {:?}", block.dropped);
    std::fs::write(path, insert_exif_segment(&jpeg, &block.tiff).unwrap()).unwrap();
}

/// Animated GIF with one opaque frame per `(width, height)`.
pub fn create_test_gif(path: &Path, sizes: &[(u32, u32)]) {
    let writer = BufWriter::new(File::create(path).unwrap());
    let mut encoder = GifEncoder::new(writer);
    let frames = sizes.iter().enumerate().map(|(i, &(w, h))| {
        let buf = RgbaImage::from_pixel(w, h, Rgba([(i * 60) as u8, 0, 0, 255]));
        AnimationFrame::from_parts(buf, 0, 0, Delay::from_numer_denom_ms(100, 1))
    });
    encoder.encode_frames(frames).unwrap();
}

/// Single-frame GIF whose left half is fully transparent.
pub fn create_test_transparent_gif(path: &Path, width: u32, height: u32) {
    let writer = BufWriter::new(File::create(path).unwrap());
    let mut encoder = GifEncoder::new(writer);
    let buf = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([200, 10, 10, 255])
        }
    });
    encoder
        .encode_frame(AnimationFrame::from_parts(buf, 0, 0, Delay::from_numer_denom_ms(100, 1)))
        .unwrap();
}

/// Multi-page 8-bit RGB TIFF, one page per `(width, height)`.
pub fn create_test_tiff(path: &Path, pages: &[(u32, u32)]) {
    let writer = BufWriter::new(File::create(path).unwrap());
    let mut encoder = TiffEncoder::new(writer).unwrap();
    for &(w, h) in pages {
        encoder
            .write_image::<colortype::RGB8>(w, h, gradient(w, h).as_raw())
            .unwrap();
    }
}

/// JPEG with an `APP2` Multi-Picture Format marker right after SOI, the way
/// MPO files start.
pub fn create_test_jpeg_with_mpf(path: &Path, width: u32, height: u32) {
    let img = gradient(width, height);
    let mut jpeg = Vec::new();
    JpegEncoder::new(&mut jpeg)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    let mut data = jpeg[..2].to_vec();
    data.extend_from_slice(&[0xFF, 0xE2, 0x00, 0x08]);
    data.extend_from_slice(b"MPF\0II");
    data.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, data).unwrap();
}
