//! EXIF tag table and EXIF block construction for JPEG output.
//!
//! The loader reports EXIF as `name → string`. On save those strings are
//! turned back into typed fields, serialized as a TIFF structure with
//! `kamadak-exif`'s writer and spliced into the JPEG as an `APP1` segment.
//!
//! [`TAG_TABLE`] is built once: tag name ↔ tag number, plus the value type
//! each tag is written with. Names not in the table may be given as raw tag
//! numbers (`"271"` or `"0x010F"`).
//!
//! Fields are converted one at a time. A field whose name is unknown, whose
//! value does not parse, or that the writer rejects is dropped; the rest of
//! the block is still written. Dropped names are returned to the caller.

use exif::experimental::Writer;
use exif::{Context, Field, In, Tag, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::LazyLock;
use tracing::debug;

/// How a tag's value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Ascii,
    Byte,
    Short,
    Long,
    Rational,
    SRational,
    Undefined,
}

/// One row of the tag table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagEntry {
    pub tag: Tag,
    pub kind: ValueKind,
}

const KNOWN_TAGS: &[(Tag, ValueKind)] = &[
    // IFD0
    (Tag::ImageDescription, ValueKind::Ascii),
    (Tag::Make, ValueKind::Ascii),
    (Tag::Model, ValueKind::Ascii),
    (Tag::Orientation, ValueKind::Short),
    (Tag::XResolution, ValueKind::Rational),
    (Tag::YResolution, ValueKind::Rational),
    (Tag::ResolutionUnit, ValueKind::Short),
    (Tag::Software, ValueKind::Ascii),
    (Tag::DateTime, ValueKind::Ascii),
    (Tag::Artist, ValueKind::Ascii),
    (Tag::YCbCrPositioning, ValueKind::Short),
    (Tag::Copyright, ValueKind::Ascii),
    // Exif IFD
    (Tag::ExposureTime, ValueKind::Rational),
    (Tag::FNumber, ValueKind::Rational),
    (Tag::ExposureProgram, ValueKind::Short),
    (Tag::PhotographicSensitivity, ValueKind::Short),
    (Tag::ExifVersion, ValueKind::Undefined),
    (Tag::DateTimeOriginal, ValueKind::Ascii),
    (Tag::DateTimeDigitized, ValueKind::Ascii),
    (Tag::OffsetTime, ValueKind::Ascii),
    (Tag::OffsetTimeOriginal, ValueKind::Ascii),
    (Tag::ShutterSpeedValue, ValueKind::SRational),
    (Tag::ApertureValue, ValueKind::Rational),
    (Tag::BrightnessValue, ValueKind::SRational),
    (Tag::ExposureBiasValue, ValueKind::SRational),
    (Tag::MaxApertureValue, ValueKind::Rational),
    (Tag::SubjectDistance, ValueKind::Rational),
    (Tag::MeteringMode, ValueKind::Short),
    (Tag::LightSource, ValueKind::Short),
    (Tag::Flash, ValueKind::Short),
    (Tag::FocalLength, ValueKind::Rational),
    (Tag::UserComment, ValueKind::Undefined),
    (Tag::SubSecTime, ValueKind::Ascii),
    (Tag::SubSecTimeOriginal, ValueKind::Ascii),
    (Tag::SubSecTimeDigitized, ValueKind::Ascii),
    (Tag::ColorSpace, ValueKind::Short),
    (Tag::PixelXDimension, ValueKind::Long),
    (Tag::PixelYDimension, ValueKind::Long),
    (Tag::SensingMethod, ValueKind::Short),
    (Tag::CustomRendered, ValueKind::Short),
    (Tag::ExposureMode, ValueKind::Short),
    (Tag::WhiteBalance, ValueKind::Short),
    (Tag::DigitalZoomRatio, ValueKind::Rational),
    (Tag::FocalLengthIn35mmFilm, ValueKind::Short),
    (Tag::SceneCaptureType, ValueKind::Short),
    (Tag::Contrast, ValueKind::Short),
    (Tag::Saturation, ValueKind::Short),
    (Tag::Sharpness, ValueKind::Short),
    (Tag::SubjectDistanceRange, ValueKind::Short),
    (Tag::ImageUniqueID, ValueKind::Ascii),
    (Tag::CameraOwnerName, ValueKind::Ascii),
    (Tag::BodySerialNumber, ValueKind::Ascii),
    (Tag::LensSpecification, ValueKind::Rational),
    (Tag::LensMake, ValueKind::Ascii),
    (Tag::LensModel, ValueKind::Ascii),
    (Tag::LensSerialNumber, ValueKind::Ascii),
    // GPS IFD
    (Tag::GPSVersionID, ValueKind::Byte),
    (Tag::GPSLatitudeRef, ValueKind::Ascii),
    (Tag::GPSLatitude, ValueKind::Rational),
    (Tag::GPSLongitudeRef, ValueKind::Ascii),
    (Tag::GPSLongitude, ValueKind::Rational),
    (Tag::GPSAltitudeRef, ValueKind::Byte),
    (Tag::GPSAltitude, ValueKind::Rational),
    (Tag::GPSTimeStamp, ValueKind::Rational),
    (Tag::GPSImgDirectionRef, ValueKind::Ascii),
    (Tag::GPSImgDirection, ValueKind::Rational),
    (Tag::GPSDateStamp, ValueKind::Ascii),
];

/// Bidirectional tag lookup, built once per process.
pub struct TagTable {
    by_name: HashMap<String, TagEntry>,
    by_number: HashMap<u16, TagEntry>,
}

pub static TAG_TABLE: LazyLock<TagTable> = LazyLock::new(|| {
    let mut by_name = HashMap::new();
    let mut by_number = HashMap::new();
    for &(tag, kind) in KNOWN_TAGS {
        let entry = TagEntry { tag, kind };
        by_name.insert(tag.to_string(), entry);
        by_number.insert(tag.number(), entry);
    }
    TagTable { by_name, by_number }
});

impl TagTable {
    /// Look up a tag by name, falling back to a raw numeric key.
    ///
    /// Raw numbers not in the table are written as ASCII in IFD0.
    pub fn resolve(&self, key: &str) -> Option<TagEntry> {
        if let Some(entry) = self.by_name.get(key) {
            return Some(*entry);
        }
        let number = parse_tag_number(key)?;
        Some(self.by_number.get(&number).copied().unwrap_or(TagEntry {
            tag: Tag(Context::Tiff, number),
            kind: ValueKind::Ascii,
        }))
    }
}

fn parse_tag_number(key: &str) -> Option<u16> {
    let key = key.trim();
    match key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => key.parse().ok(),
    }
}

// =============================================================================
// Reading: field → string
// =============================================================================

/// String form of an EXIF field as reported by the loader.
///
/// Text-like values (ASCII, undefined, byte) are decoded as UTF-8 when they
/// are clean text; numbers are joined with `", "`, rationals kept as `n/d`.
/// Anything else uses kamadak-exif's display form.
pub fn field_to_string(field: &Field) -> String {
    match &field.value {
        Value::Ascii(parts) => {
            let decoded: Option<Vec<String>> =
                parts.iter().map(|p| decode_text(p)).collect();
            decoded
                .map(|d| d.join(", "))
                .unwrap_or_else(|| field.display_value().to_string())
        }
        Value::Undefined(bytes, _) => {
            decode_text(bytes).unwrap_or_else(|| field.display_value().to_string())
        }
        Value::Byte(bytes) => decode_text(bytes)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| join(bytes)),
        Value::Short(v) => join(v),
        Value::Long(v) => join(v),
        Value::SByte(v) => join(v),
        Value::SShort(v) => join(v),
        Value::SLong(v) => join(v),
        Value::Rational(v) => v
            .iter()
            .map(|r| format!("{}/{}", r.num, r.denom))
            .collect::<Vec<_>>()
            .join(", "),
        Value::SRational(v) => v
            .iter()
            .map(|r| format!("{}/{}", r.num, r.denom))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Float(v) => join(v),
        Value::Double(v) => join(v),
        _ => field.display_value().to_string(),
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// UTF-8 text without trailing NULs, `None` if it is not printable text.
fn decode_text(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let text = std::str::from_utf8(&bytes[..end]).ok()?;
    if text.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return None;
    }
    Some(text.to_string())
}

// =============================================================================
// Writing: string → field → TIFF block
// =============================================================================

/// Convert a reported string back into a typed value.
pub fn parse_value(kind: ValueKind, raw: &str) -> Result<Value, String> {
    match kind {
        ValueKind::Ascii => Ok(Value::Ascii(vec![raw.as_bytes().to_vec()])),
        ValueKind::Undefined => Ok(Value::Undefined(raw.as_bytes().to_vec(), 0)),
        ValueKind::Byte => match parse_list::<u8>(raw) {
            Ok(v) => Ok(Value::Byte(v)),
            Err(_) => Ok(Value::Byte(raw.as_bytes().to_vec())),
        },
        ValueKind::Short => parse_list::<u16>(raw).map(Value::Short),
        ValueKind::Long => parse_list::<u32>(raw).map(Value::Long),
        ValueKind::Rational => split_list(raw)
            .map(|s| {
                let (num, denom) = parse_fraction(s)?;
                let num = u32::try_from(num).map_err(|_| format!("out of range: {s}"))?;
                let denom = u32::try_from(denom).map_err(|_| format!("out of range: {s}"))?;
                Ok(exif::Rational { num, denom })
            })
            .collect::<Result<Vec<_>, String>>()
            .map(Value::Rational),
        ValueKind::SRational => split_list(raw)
            .map(|s| {
                let (num, denom) = parse_fraction(s)?;
                let num = i32::try_from(num).map_err(|_| format!("out of range: {s}"))?;
                let denom = i32::try_from(denom).map_err(|_| format!("out of range: {s}"))?;
                Ok(exif::SRational { num, denom })
            })
            .collect::<Result<Vec<_>, String>>()
            .map(Value::SRational),
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_list<T: std::str::FromStr>(raw: &str) -> Result<Vec<T>, String> {
    let values = split_list(raw)
        .map(|s| s.parse::<T>().map_err(|_| format!("not a number: {s}")))
        .collect::<Result<Vec<T>, String>>()?;
    if values.is_empty() {
        return Err("empty value".into());
    }
    Ok(values)
}

/// `"1/125"` → (1, 125); `"2.8"` → (14, 5); `"72"` → (72, 1).
fn parse_fraction(s: &str) -> Result<(i64, i64), String> {
    if let Some((n, d)) = s.split_once('/') {
        let num = n.trim().parse::<i64>().map_err(|_| format!("bad fraction: {s}"))?;
        let denom = d.trim().parse::<i64>().map_err(|_| format!("bad fraction: {s}"))?;
        return Ok((num, denom));
    }
    let v: f64 = s.parse().map_err(|_| format!("not a number: {s}"))?;
    if !v.is_finite() {
        return Err(format!("not finite: {s}"));
    }
    if v.fract() == 0.0 {
        return Ok((v as i64, 1));
    }
    let denom = 10_000i64;
    let num = (v * denom as f64).round() as i64;
    let g = gcd(num.unsigned_abs(), denom as u64) as i64;
    Ok((num / g, denom / g))
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

/// A serialized EXIF block plus the names that could not be included.
#[derive(Debug, Default)]
pub struct ExifBlock {
    /// TIFF-structured EXIF data; empty when no field survived.
    pub tiff: Vec<u8>,
    pub dropped: Vec<String>,
}

fn serialize_fields(fields: &[&Field]) -> Result<Vec<u8>, exif::Error> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false)?;
    Ok(buf.into_inner())
}

/// Convert `entries` into a TIFF-structured EXIF block.
pub fn build_exif_block(entries: &BTreeMap<String, String>) -> ExifBlock {
    let mut block = ExifBlock::default();
    let mut accepted: Vec<Field> = Vec::new();
    let mut seen: HashSet<Tag> = HashSet::new();

    for (name, raw) in entries {
        let Some(entry) = TAG_TABLE.resolve(name) else {
            debug!(tag = %name, "dropping EXIF field: unknown tag");
            block.dropped.push(name.clone());
            continue;
        };
        if !seen.insert(entry.tag) {
            debug!(tag = %name, "dropping EXIF field: duplicate tag");
            block.dropped.push(name.clone());
            continue;
        }
        let value = match parse_value(entry.kind, raw) {
            Ok(value) => value,
            Err(reason) => {
                debug!(tag = %name, %reason, "dropping EXIF field: value does not convert");
                block.dropped.push(name.clone());
                continue;
            }
        };
        let field = Field {
            tag: entry.tag,
            ifd_num: In::PRIMARY,
            value,
        };
        if let Err(e) = serialize_fields(&[&field]) {
            debug!(tag = %name, error = %e, "dropping EXIF field: writer rejected it");
            block.dropped.push(name.clone());
            continue;
        }
        accepted.push(field);
    }

    if accepted.is_empty() {
        return block;
    }
    let refs: Vec<&Field> = accepted.iter().collect();
    match serialize_fields(&refs) {
        Ok(tiff) => block.tiff = tiff,
        Err(e) => {
            debug!(error = %e, "dropping EXIF block: combined write failed");
            block
                .dropped
                .extend(accepted.iter().map(|f| f.tag.to_string()));
        }
    }
    block
}

// =============================================================================
// JPEG APP1 splicing
// =============================================================================

const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Insert an `APP1` EXIF segment into an encoded JPEG.
///
/// The segment goes right after SOI, or after a leading JFIF `APP0`.
pub fn insert_exif_segment(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>, String> {
    if jpeg.len() < 4 || jpeg[0..2] != [0xFF, 0xD8] {
        return Err("not a JPEG stream".into());
    }
    let seg_len = 2 + EXIF_HEADER.len() + tiff.len();
    let seg_len = u16::try_from(seg_len).map_err(|_| "EXIF block exceeds 64 KiB".to_string())?;

    let mut insert_at = 2;
    if jpeg[2..4] == [0xFF, 0xE0] && jpeg.len() >= 6 {
        let app0_len = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
        insert_at = (4 + app0_len).min(jpeg.len());
    }

    let mut out = Vec::with_capacity(jpeg.len() + seg_len as usize + 2);
    out.extend_from_slice(&jpeg[..insert_at]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&seg_len.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[insert_at..]);
    Ok(out)
}
