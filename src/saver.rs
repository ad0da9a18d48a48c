//! The Image Saver node.
//!
//! One [`SaveRequest`] becomes one file per frame. The target encoding and
//! its settings come from the revisioned decision table in
//! [`crate::imaging::plan`]; naming depends on the revision too:
//!
//! | | `v1` | `v2` |
//! |---|---|---|
//! | Frame 0 | `<name>.<ext>`, overwritten | `<name>.<ext>`, then `_1`, `_2`, … until free |
//! | Frame i | `<name>_<i>.<ext>`, overwritten | same rule as frame 0 |
//! | Encoder failure | `<name>_<i or ''>.png` | `<name>.png`, collision-avoided |
//! | `always_save_png` | ignored | PNG copy under `<output>/<archive_dir>/` |
//!
//! Collision avoidance checks then creates; two concurrent saves of the same
//! name can race.

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::host::Host;
use crate::imaging::frames::frame_to_rgb8;
use crate::imaging::writers::write_png;
use crate::imaging::{
    EncodePlan, Encoding, Quality, TableRevision, WriteOptions, base_filename, build_exif_block,
    legacy_fallback_filename, legacy_frame_filename, plan, png_level, write_image,
};
use crate::naming::next_free_path;
use crate::types::Frame;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The saver's `format` choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Use the request's `original_format`.
    #[default]
    Original,
    Avif,
    Webp,
    Jpg,
    Png,
    Tiff,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 6] = [
        TargetFormat::Original,
        TargetFormat::Avif,
        TargetFormat::Webp,
        TargetFormat::Jpg,
        TargetFormat::Png,
        TargetFormat::Tiff,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetFormat::Original => "original",
            TargetFormat::Avif => "avif",
            TargetFormat::Webp => "webp",
            TargetFormat::Jpg => "jpg",
            TargetFormat::Png => "png",
            TargetFormat::Tiff => "tiff",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" => Ok(TargetFormat::Original),
            "avif" => Ok(TargetFormat::Avif),
            "webp" => Ok(TargetFormat::Webp),
            "jpg" | "jpeg" => Ok(TargetFormat::Jpg),
            "png" => Ok(TargetFormat::Png),
            "tiff" | "tif" => Ok(TargetFormat::Tiff),
            other => Err(format!(
                "unknown format '{other}' (expected original, avif, webp, jpg, png or tiff)"
            )),
        }
    }
}

/// Everything the saver needs for one execution.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    /// One file is written per frame.
    pub frames: Vec<Frame>,
    pub filename: String,
    pub format: TargetFormat,
    /// Encoding used when `format` is [`TargetFormat::Original`].
    pub original_format: String,
    pub quality: Quality,
    /// Stamped on PNG, JPEG and TIFF output when positive.
    pub dpi: u32,
    /// JSON object of EXIF tag name → value, re-attached to JPEG output.
    pub exif: String,
    pub always_save_png: bool,
    /// Register written files with the host for display.
    pub image_preview: bool,
    /// The host's execution prompt, embedded in the archive PNG.
    pub prompt: Option<serde_json::Value>,
    /// The host's extra metadata object, embedded in the archive PNG.
    pub extra_pnginfo: Option<serde_json::Value>,
}

impl Default for SaveRequest {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            filename: "image".to_string(),
            format: TargetFormat::Original,
            original_format: "png".to_string(),
            quality: Quality::default(),
            dpi: 96,
            exif: "{}".to_string(),
            always_save_png: false,
            image_preview: true,
            prompt: None,
            extra_pnginfo: None,
        }
    }
}

impl SaveRequest {
    /// Lowercase target name: `original_format` for [`TargetFormat::Original`].
    pub fn target_name(&self) -> String {
        let name = match self.format {
            TargetFormat::Original => self.original_format.trim(),
            other => other.as_str(),
        };
        if name.is_empty() {
            "png".to_string()
        } else {
            name.to_ascii_lowercase()
        }
    }
}

/// What a save wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveOutcome {
    /// File name of the first written file.
    pub filename: String,
    /// One path per frame, in frame order.
    pub files: Vec<PathBuf>,
    /// `always_save_png` copies.
    pub archived: Vec<PathBuf>,
    /// EXIF names that could not be re-attached to JPEG output.
    pub dropped_exif: Vec<String>,
}

/// Parse the EXIF JSON input. Empty, `{}` and malformed input give an empty
/// map; non-string values keep their JSON text.
pub fn parse_exif_json(raw: &str) -> BTreeMap<String, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "{}" {
        return BTreeMap::new();
    }
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
        Ok(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
        Err(e) => {
            debug!(error = %e, "ignoring malformed EXIF JSON");
            BTreeMap::new()
        }
    }
}

/// Image Saver bound to a host and a configuration.
pub struct Saver<'a, H: Host + ?Sized> {
    host: &'a H,
    config: &'a NodeConfig,
}

impl<'a, H: Host + ?Sized> Saver<'a, H> {
    pub fn new(host: &'a H, config: &'a NodeConfig) -> Self {
        Self { host, config }
    }

    fn revision(&self) -> TableRevision {
        self.config.revision
    }

    pub fn save(&self, request: &SaveRequest) -> Result<SaveOutcome> {
        if request.frames.is_empty() {
            return Err(NodeError::Encode("request has no frames".into()));
        }
        let output_dir = self.host.output_dir().to_path_buf();
        std::fs::create_dir_all(&output_dir)?;

        let ext = request.target_name();
        let encoding = Encoding::from_name(&ext);
        let plan = plan(self.revision(), &encoding, request.quality, &self.config.saver);
        debug!(?plan, revision = %self.revision(), "resolved encoder settings");

        let mut outcome = SaveOutcome::default();
        let exif_block = if matches!(plan, EncodePlan::Jpeg { .. }) {
            let block = build_exif_block(&parse_exif_json(&request.exif));
            outcome.dropped_exif = block.dropped;
            block.tiff
        } else {
            Vec::new()
        };
        let opts = WriteOptions {
            dpi: request.dpi,
            exif: &exif_block,
            text_chunks: Vec::new(),
            avif_speed: self.config.saver.avif_speed,
        };

        for (index, frame) in request.frames.iter().enumerate() {
            let rgb = frame_to_rgb8(frame);
            let target = self.frame_path(&output_dir, &request.filename, &ext, index);
            let written = match write_image(&target, &rgb, &plan, &opts) {
                Ok(()) => target,
                Err(e) if e.wants_fallback() => {
                    debug!(path = %target.display(), error = %e, "encoder failed, falling back to PNG");
                    let fallback = self.fallback_path(&output_dir, &request.filename, index);
                    let level = png_level(self.revision(), request.quality, &self.config.saver);
                    write_png(&fallback, &rgb, level, &opts)?;
                    fallback
                }
                Err(e) => return Err(e.into()),
            };
            info!(path = %written.display(), "saved image");
            outcome.files.push(written);

            if request.always_save_png && self.revision() == TableRevision::V2 {
                outcome
                    .archived
                    .push(self.archive(&output_dir, request, &rgb)?);
            }
        }

        outcome.filename = outcome
            .files
            .first()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if request.image_preview {
            for path in &outcome.files {
                self.host.register_output(path);
            }
        }
        Ok(outcome)
    }

    fn frame_path(&self, output_dir: &Path, filename: &str, ext: &str, index: usize) -> PathBuf {
        match self.revision() {
            TableRevision::V1 => output_dir.join(legacy_frame_filename(filename, ext, index)),
            TableRevision::V2 => next_free_path(&output_dir.join(base_filename(filename, ext))),
        }
    }

    fn fallback_path(&self, output_dir: &Path, filename: &str, index: usize) -> PathBuf {
        match self.revision() {
            TableRevision::V1 => output_dir.join(legacy_fallback_filename(filename, index)),
            TableRevision::V2 => next_free_path(&output_dir.join(base_filename(filename, "png"))),
        }
    }

    /// Write the lossless PNG copy with the host's prompt metadata.
    fn archive(&self, output_dir: &Path, request: &SaveRequest, rgb: &RgbImage) -> Result<PathBuf> {
        let dir = output_dir.join(&self.config.saver.archive_dir);
        std::fs::create_dir_all(&dir)?;
        let stem = Path::new(&request.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| request.filename.clone());
        let path = next_free_path(&dir.join(base_filename(&stem, "png")));

        let mut text_chunks = Vec::new();
        if let Some(prompt) = &request.prompt {
            text_chunks.push(("prompt".to_string(), prompt.to_string()));
        }
        if let Some(extra) = &request.extra_pnginfo {
            text_chunks.push(("extra_pnginfo".to_string(), extra.to_string()));
        }
        let opts = WriteOptions {
            dpi: request.dpi,
            text_chunks,
            ..Default::default()
        };
        write_png(&path, rgb, self.config.saver.png_compress_level.min(9), &opts)?;
        debug!(path = %path.display(), "archived PNG copy");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests::MockHost;
    use crate::metadata::png_info;
    use image::Rgb;
    use tempfile::TempDir;

    fn frame(w: u32, h: u32) -> Frame {
        Frame::from_fn(w, h, |x, y| Rgb([x as f32 / w as f32, y as f32 / h as f32, 0.5]))
    }

    fn request(format: TargetFormat) -> SaveRequest {
        SaveRequest {
            frames: vec![frame(12, 8)],
            filename: "shot".into(),
            format,
            ..Default::default()
        }
    }

    fn v1() -> NodeConfig {
        NodeConfig {
            revision: TableRevision::V1,
            ..Default::default()
        }
    }

    // =========================================================================
    // Target selection and EXIF JSON
    // =========================================================================

    #[test]
    fn original_uses_original_format() {
        let mut req = request(TargetFormat::Original);
        req.original_format = "JPEG".into();
        assert_eq!(req.target_name(), "jpeg");
        req.original_format = "".into();
        assert_eq!(req.target_name(), "png");
        assert_eq!(request(TargetFormat::Webp).target_name(), "webp");
    }

    #[test]
    fn target_format_parses_aliases() {
        assert_eq!("JPEG".parse::<TargetFormat>().unwrap(), TargetFormat::Jpg);
        assert_eq!("tif".parse::<TargetFormat>().unwrap(), TargetFormat::Tiff);
        assert!("bmp".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn exif_json_parsing() {
        assert!(parse_exif_json("").is_empty());
        assert!(parse_exif_json("{}").is_empty());
        assert!(parse_exif_json("{not json").is_empty());
        assert!(parse_exif_json("[1, 2]").is_empty());

        let map = parse_exif_json(r#"{"Make": "Acme", "ISOSpeedRatings": 200}"#);
        assert_eq!(map["Make"], "Acme");
        assert_eq!(map["ISOSpeedRatings"], "200");
    }

    // =========================================================================
    // Naming
    // =========================================================================

    #[test]
    fn saving_twice_gives_distinct_names() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig::default();
        let saver = Saver::new(&host, &config);

        let first = saver.save(&request(TargetFormat::Png)).unwrap();
        let second = saver.save(&request(TargetFormat::Png)).unwrap();
        assert_eq!(first.filename, "shot.png");
        assert_eq!(second.filename, "shot_1.png");
        assert_ne!(first.files, second.files);
    }

    #[test]
    fn existing_extension_is_not_doubled() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig::default();
        let mut req = request(TargetFormat::Png);
        req.filename = "shot.png".into();
        let outcome = Saver::new(&host, &config).save(&req).unwrap();
        assert_eq!(outcome.filename, "shot.png");
    }

    #[test]
    fn v2_batch_frames_avoid_each_other() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig::default();
        let mut req = request(TargetFormat::Png);
        req.frames = vec![frame(4, 4), frame(4, 4), frame(4, 4)];
        let outcome = Saver::new(&host, &config).save(&req).unwrap();
        let names: Vec<_> = outcome
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["shot.png", "shot_1.png", "shot_2.png"]);
    }

    #[test]
    fn v1_batch_naming_overwrites() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = v1();
        let mut req = request(TargetFormat::Png);
        req.frames = vec![frame(4, 4), frame(4, 4)];
        let saver = Saver::new(&host, &config);
        let first = saver.save(&req).unwrap();
        let second = saver.save(&req).unwrap();
        assert_eq!(first.files, second.files);
        assert!(tmp.path().join("shot.png").exists());
        assert!(tmp.path().join("shot_1.png").exists());
    }

    #[test]
    fn unknown_format_falls_back_to_png() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig::default();
        let mut req = request(TargetFormat::Original);
        req.original_format = "xyz".into();
        let outcome = Saver::new(&host, &config).save(&req).unwrap();
        assert_eq!(outcome.filename, "shot.png");
        assert!(!tmp.path().join("shot.xyz").exists());
    }

    #[test]
    fn v1_fallback_keeps_trailing_underscore() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = v1();
        let mut req = request(TargetFormat::Original);
        req.original_format = "xyz".into();
        let outcome = Saver::new(&host, &config).save(&req).unwrap();
        assert_eq!(outcome.filename, "shot_.png");
    }

    // =========================================================================
    // Formats and metadata
    // =========================================================================

    #[test]
    fn jpeg_reattaches_exif_and_reports_drops() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig::default();
        let mut req = request(TargetFormat::Jpg);
        req.exif = r#"{"Make": "Acme", "NotARealTag": "x"}"#.into();
        let outcome = Saver::new(&host, &config).save(&req).unwrap();
        assert_eq!(outcome.dropped_exif, ["NotARealTag"]);

        let file = std::fs::File::open(&outcome.files[0]).unwrap();
        let exif = exif::Reader::new()
            .read_from_container(&mut std::io::BufReader::new(file))
            .unwrap();
        let make = exif.get_field(exif::Tag::Make, exif::In::PRIMARY).unwrap();
        assert_eq!(crate::imaging::field_to_string(make), "Acme");
    }

    #[test]
    fn png_stamps_dpi() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig::default();
        let mut req = request(TargetFormat::Png);
        req.dpi = 300;
        let outcome = Saver::new(&host, &config).save(&req).unwrap();
        let dims = png_info(&outcome.files[0]).unwrap().pixel_dims.unwrap();
        assert_eq!(dims.xppu, 11811);
    }

    #[test]
    fn every_target_preserves_size() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig {
            saver: crate::config::SaverConfig {
                avif_speed: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        let saver = Saver::new(&host, &config);
        for format in [
            TargetFormat::Png,
            TargetFormat::Jpg,
            TargetFormat::Webp,
            TargetFormat::Avif,
            TargetFormat::Tiff,
        ] {
            let outcome = saver.save(&request(format)).unwrap();
            let path = &outcome.files[0];
            assert_eq!(
                path.extension().unwrap().to_str().unwrap(),
                format.as_str(),
                "{format}"
            );
            let dims = if format == TargetFormat::Avif {
                crate::imaging::avif::avif_dimensions(path).unwrap()
            } else {
                image::image_dimensions(path).unwrap()
            };
            assert_eq!(dims, (12, 8), "{format}");
        }
    }

    // =========================================================================
    // Archive copies and host registration
    // =========================================================================

    #[test]
    fn always_save_png_archives_with_prompt() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig::default();
        let mut req = request(TargetFormat::Jpg);
        req.always_save_png = true;
        req.prompt = Some(serde_json::json!({"3": {"class_type": "KSampler"}}));
        let outcome = Saver::new(&host, &config).save(&req).unwrap();

        assert_eq!(outcome.archived, [tmp.path().join("PNG").join("shot.png")]);
        let reader = png::Decoder::new(std::fs::File::open(&outcome.archived[0]).unwrap())
            .read_info()
            .unwrap();
        let texts = &reader.info().uncompressed_latin1_text;
        assert!(texts.iter().any(|t| t.keyword == "prompt"));
        assert!(!texts.iter().any(|t| t.keyword == "extra_pnginfo"));
        assert_eq!(host.get_registered(), outcome.files);
    }

    #[test]
    fn v1_ignores_always_save_png() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = v1();
        let mut req = request(TargetFormat::Png);
        req.always_save_png = true;
        let outcome = Saver::new(&host, &config).save(&req).unwrap();
        assert!(outcome.archived.is_empty());
        assert!(!tmp.path().join("PNG").exists());
    }

    #[test]
    fn preview_off_registers_nothing() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig::default();
        let mut req = request(TargetFormat::Png);
        req.image_preview = false;
        Saver::new(&host, &config).save(&req).unwrap();
        assert!(host.get_registered().is_empty());
    }

    #[test]
    fn empty_request_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let host = MockHost::new(tmp.path());
        let config = NodeConfig::default();
        let req = SaveRequest::default();
        assert!(matches!(
            Saver::new(&host, &config).save(&req),
            Err(NodeError::Encode(_))
        ));
    }
}
