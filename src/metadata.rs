//! Best-effort container metadata: DPI, EXIF and orientation.
//!
//! Nothing here fails a load. Each probe returns a [`MetadataProbe`] so that
//! "the file has no such field" ([`Absent`](MetadataProbe::Absent)) can be
//! told apart from "the field is there but unreadable"
//! ([`Malformed`](MetadataProbe::Malformed)); the loader then substitutes
//! its default.
//!
//! ## DPI sources, first hit wins
//!
//! | Container | Field | Unit handling |
//! |---|---|---|
//! | PNG | `pHYs` | pixels per metre × 0.0254; unit "unspecified" is absent |
//! | JPEG | JFIF `APP0` density | unit 1 = dpi, 2 = dots/cm × 2.54, 0 = aspect only |
//! | TIFF | `XResolution` + `ResolutionUnit` | 2 = inch, 3 = cm × 2.54 |
//! | BMP | header `biXPelsPerMeter` | × 0.0254 |
//! | any with EXIF | `XResolution` + `ResolutionUnit` | as TIFF |
//!
//! Only the horizontal resolution is reported.
//!
//! ## EXIF
//!
//! Read with `kamadak-exif` from JPEG, TIFF, PNG, WebP and AVIF. Only fields
//! of the primary image with a known tag are reported, keyed by tag name.

use crate::imaging::field_to_string;
use crate::types::MetadataProbe;
use exif::{In, Tag};
use image::ImageFormat;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const INCHES_PER_METRE: f64 = 0.0254;
const CM_PER_INCH: f64 = 2.54;

/// Header facts of a PNG file the `image` crate does not expose.
#[derive(Debug, Clone)]
pub struct PngInfo {
    pub color_type: png::ColorType,
    /// A `tRNS` chunk is present.
    pub has_trns: bool,
    pub pixel_dims: Option<png::PixelDimensions>,
}

/// Read the PNG header chunks (everything before the first `IDAT`).
pub fn png_info(path: &Path) -> Result<PngInfo, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let reader = png::Decoder::new(BufReader::new(file))
        .read_info()
        .map_err(|e| e.to_string())?;
    let info = reader.info();
    Ok(PngInfo {
        color_type: info.color_type,
        has_trns: info.trns.is_some(),
        pixel_dims: info.pixel_dims,
    })
}

/// Metadata gathered from one file.
#[derive(Debug)]
pub struct ContainerMetadata {
    pub dpi: MetadataProbe<u32>,
    pub exif: BTreeMap<String, String>,
    /// Number of reported EXIF fields, or why there are none.
    pub exif_probe: MetadataProbe<usize>,
    /// EXIF orientation (1–8), when present.
    pub orientation: Option<u32>,
    /// PNG header facts, for PNG files.
    pub png: Option<PngInfo>,
    /// JPEG stream with a Multi-Picture index.
    pub multi_picture: bool,
}

/// Probe everything the loader reports besides pixels.
pub fn read_container_metadata(path: &Path, format: Option<ImageFormat>) -> ContainerMetadata {
    let png = match format {
        Some(ImageFormat::Png) => png_info(path).ok(),
        _ => None,
    };
    let exif = read_exif(path, format);
    let mut multi_picture = false;

    let container_dpi = match format {
        Some(ImageFormat::Png) => match &png {
            Some(info) => dpi_from_png(info),
            None => MetadataProbe::Malformed("unreadable PNG header".into()),
        },
        Some(ImageFormat::Jpeg) => match std::fs::read(path) {
            Ok(bytes) => {
                multi_picture = is_multi_picture(&bytes);
                dpi_from_jfif(&bytes)
            }
            Err(e) => MetadataProbe::Malformed(e.to_string()),
        },
        Some(ImageFormat::Tiff) => dpi_from_tiff(path),
        Some(ImageFormat::Bmp) => with_bytes(path, dpi_from_bmp),
        _ => MetadataProbe::Absent,
    };
    let dpi = match container_dpi {
        MetadataProbe::Present(dpi) => MetadataProbe::Present(dpi),
        other => match &exif {
            MetadataProbe::Present(exif) => match dpi_from_exif(exif) {
                MetadataProbe::Present(dpi) => MetadataProbe::Present(dpi),
                _ => other,
            },
            _ => other,
        },
    };

    let (exif_map, exif_probe, orientation) = match &exif {
        MetadataProbe::Present(exif) => {
            let map = exif_to_map(exif);
            let count = map.len();
            (map, MetadataProbe::Present(count), orientation_of(exif))
        }
        MetadataProbe::Absent => (BTreeMap::new(), MetadataProbe::Absent, None),
        MetadataProbe::Malformed(reason) => (
            BTreeMap::new(),
            MetadataProbe::Malformed(reason.clone()),
            None,
        ),
    };

    ContainerMetadata {
        dpi,
        exif: exif_map,
        exif_probe,
        orientation,
        png,
        multi_picture,
    }
}

fn with_bytes(path: &Path, probe: fn(&[u8]) -> MetadataProbe<u32>) -> MetadataProbe<u32> {
    match std::fs::read(path) {
        Ok(bytes) => probe(&bytes),
        Err(e) => MetadataProbe::Malformed(e.to_string()),
    }
}

fn round_dpi(value: f64) -> MetadataProbe<u32> {
    if value.is_finite() && value > 0.0 {
        MetadataProbe::Present(value.round() as u32)
    } else {
        MetadataProbe::Malformed(format!("non-positive resolution {value}"))
    }
}

// =============================================================================
// DPI probes
// =============================================================================

pub fn dpi_from_png(info: &PngInfo) -> MetadataProbe<u32> {
    match info.pixel_dims {
        Some(dims) if dims.unit == png::Unit::Meter => {
            round_dpi(dims.xppu as f64 * INCHES_PER_METRE)
        }
        _ => MetadataProbe::Absent,
    }
}

/// Walk the marker segments of a JPEG stream up to SOS, handing each
/// `(marker, payload)` to `visit` until it returns `Some`.
fn walk_jpeg_segments<T>(
    data: &[u8],
    mut visit: impl FnMut(u8, &[u8]) -> Option<T>,
) -> Result<Option<T>, String> {
    if data.len() < 4 || data[0..2] != [0xFF, 0xD8] {
        return Err("missing JPEG SOI marker".into());
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return Err(format!("expected marker at offset {pos}"));
        }
        let marker = data[pos + 1];
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        if marker == 0xFF || (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            pos += if marker == 0xFF { 1 } else { 2 };
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if len < 2 {
            return Err(format!("bad segment length {len} at offset {pos}"));
        }
        let start = (pos + 4).min(data.len());
        let end = (pos + 2 + len).min(data.len());
        if let Some(found) = visit(marker, &data[start..end.max(start)]) {
            return Ok(Some(found));
        }
        pos += 2 + len;
    }
    Ok(None)
}

/// Density from the JFIF `APP0` segment.
pub fn dpi_from_jfif(data: &[u8]) -> MetadataProbe<u32> {
    let found = walk_jpeg_segments(data, |marker, segment| {
        (marker == 0xE0 && segment.starts_with(b"JFIF\0")).then(|| jfif_density(segment))
    });
    match found {
        Ok(Some(probe)) => probe,
        Ok(None) => MetadataProbe::Absent,
        Err(reason) => MetadataProbe::Malformed(reason),
    }
}

fn jfif_density(segment: &[u8]) -> MetadataProbe<u32> {
    if segment.len() < 12 {
        return MetadataProbe::Malformed("truncated JFIF segment".into());
    }
    let units = segment[7];
    let density = u16::from_be_bytes([segment[8], segment[9]]) as f64;
    match units {
        1 => round_dpi(density),
        2 => round_dpi(density * CM_PER_INCH),
        0 => MetadataProbe::Absent,
        other => MetadataProbe::Malformed(format!("unknown JFIF density unit {other}")),
    }
}

/// Whether a JPEG stream carries an `APP2` Multi-Picture Format index (MPO).
pub fn is_multi_picture(data: &[u8]) -> bool {
    matches!(
        walk_jpeg_segments(data, |marker, segment| {
            (marker == 0xE2 && segment.starts_with(b"MPF\0")).then_some(())
        }),
        Ok(Some(()))
    )
}

pub fn dpi_from_tiff(path: &Path) -> MetadataProbe<u32> {
    use tiff::decoder::Decoder;
    use tiff::decoder::ifd::Value;
    use tiff::tags::Tag as TiffTag;

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => return MetadataProbe::Malformed(e.to_string()),
    };
    let mut decoder = match Decoder::new(BufReader::new(file)) {
        Ok(d) => d,
        Err(e) => return MetadataProbe::Malformed(e.to_string()),
    };
    let resolution = match decoder.find_tag(TiffTag::XResolution) {
        Ok(Some(Value::Rational(n, d))) => rational(n as f64, d as f64),
        Ok(Some(Value::List(values))) => match values.first() {
            Some(Value::Rational(n, d)) => rational(*n as f64, *d as f64),
            _ => return MetadataProbe::Malformed("XResolution is not rational".into()),
        },
        Ok(Some(_)) => return MetadataProbe::Malformed("XResolution is not rational".into()),
        Ok(None) => return MetadataProbe::Absent,
        Err(e) => return MetadataProbe::Malformed(e.to_string()),
    };
    let Some(resolution) = resolution else {
        return MetadataProbe::Malformed("XResolution has zero denominator".into());
    };
    let unit = match decoder.find_tag(TiffTag::ResolutionUnit) {
        Ok(Some(v)) => v.into_u16().unwrap_or(2),
        _ => 2,
    };
    apply_resolution_unit(resolution, unit as u32)
}

/// `biXPelsPerMeter` from a BMP `BITMAPINFOHEADER`.
pub fn dpi_from_bmp(data: &[u8]) -> MetadataProbe<u32> {
    if data.len() < 42 || &data[0..2] != b"BM" {
        return MetadataProbe::Malformed("truncated BMP header".into());
    }
    let ppm = i32::from_le_bytes([data[38], data[39], data[40], data[41]]);
    if ppm == 0 {
        return MetadataProbe::Absent;
    }
    round_dpi(ppm as f64 * INCHES_PER_METRE)
}

fn dpi_from_exif(exif: &exif::Exif) -> MetadataProbe<u32> {
    let Some(field) = exif.get_field(Tag::XResolution, In::PRIMARY) else {
        return MetadataProbe::Absent;
    };
    let resolution = match &field.value {
        exif::Value::Rational(v) if !v.is_empty() => rational(v[0].num as f64, v[0].denom as f64),
        _ => return MetadataProbe::Malformed("EXIF XResolution is not rational".into()),
    };
    let Some(resolution) = resolution else {
        return MetadataProbe::Malformed("EXIF XResolution has zero denominator".into());
    };
    let unit = exif
        .get_field(Tag::ResolutionUnit, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(2);
    apply_resolution_unit(resolution, unit)
}

fn rational(num: f64, denom: f64) -> Option<f64> {
    (denom != 0.0).then(|| num / denom)
}

fn apply_resolution_unit(resolution: f64, unit: u32) -> MetadataProbe<u32> {
    match unit {
        2 => round_dpi(resolution),
        3 => round_dpi(resolution * CM_PER_INCH),
        1 => MetadataProbe::Absent,
        other => MetadataProbe::Malformed(format!("unknown resolution unit {other}")),
    }
}

// =============================================================================
// EXIF
// =============================================================================

fn read_exif(path: &Path, format: Option<ImageFormat>) -> MetadataProbe<exif::Exif> {
    if !matches!(
        format,
        Some(
            ImageFormat::Jpeg
                | ImageFormat::Tiff
                | ImageFormat::Png
                | ImageFormat::WebP
                | ImageFormat::Avif
        )
    ) {
        return MetadataProbe::Absent;
    }
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => return MetadataProbe::Malformed(e.to_string()),
    };
    match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(exif) => MetadataProbe::Present(exif),
        Err(exif::Error::NotFound(_)) => MetadataProbe::Absent,
        Err(e) => MetadataProbe::Malformed(e.to_string()),
    }
}

/// Known primary-image tags by name.
pub fn exif_to_map(exif: &exif::Exif) -> BTreeMap<String, String> {
    exif.fields()
        .filter(|f| f.ifd_num == In::PRIMARY && f.tag.description().is_some())
        .map(|f| (f.tag.to_string(), field_to_string(f)))
        .collect()
}

fn orientation_of(exif: &exif::Exif) -> Option<u32> {
    exif.get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .filter(|v| (1..=8).contains(v))
}
