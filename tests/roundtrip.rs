//! Load → save → load through a real directory host.
//!
//! Fixtures are generated with the `image` crate into a temp directory laid
//! out like a host install: `input/` and `output/`.

use image::codecs::gif::GifEncoder;
use image::{Delay, Frame as AnimationFrame, Rgb, RgbImage, Rgba, RgbaImage};
use image_with_info::config::NodeConfig;
use image_with_info::imaging::{Quality, TableRevision};
use image_with_info::{DirectoryHost, Loader, NodeError, SaveRequest, Saver, TargetFormat};
use std::path::Path;
use tempfile::TempDir;

struct Workspace {
    _tmp: TempDir,
    host: DirectoryHost,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input");
        let output = tmp.path().join("output");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&output).unwrap();
        let host = DirectoryHost::new(&input, &output);
        Self { _tmp: tmp, host }
    }

    fn input(&self, name: &str) -> std::path::PathBuf {
        self.host.input_dir().join(name)
    }
}

fn write_rgb_png(path: &Path, w: u32, h: u32) {
    RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 99]))
        .save(path)
        .unwrap();
}

fn write_gif(path: &Path, frames: usize, w: u32, h: u32) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GifEncoder::new(file);
    encoder
        .encode_frames((0..frames).map(|i| {
            let buf = RgbaImage::from_pixel(w, h, Rgba([(i * 80) as u8, 10, 10, 255]));
            AnimationFrame::from_parts(buf, 0, 0, Delay::from_numer_denom_ms(50, 1))
        }))
        .unwrap();
}

// =============================================================================
// Loader properties
// =============================================================================

#[test]
fn resave_in_same_format_preserves_size() {
    let ws = Workspace::new();
    write_rgb_png(&ws.input("cat.png"), 33, 17);
    let config = NodeConfig::default();

    let loaded = Loader::new(&ws.host, &config).load("cat.png").unwrap();
    let outcome = Saver::new(&ws.host, &config)
        .save(&SaveRequest {
            frames: loaded.frames.clone(),
            filename: loaded.metadata.filename.clone(),
            original_format: loaded.metadata.format.clone(),
            ..Default::default()
        })
        .unwrap();

    let reloaded = Loader::new(&ws.host, &config)
        .load(&format!("{} [output]", outcome.filename))
        .unwrap();
    assert_eq!(
        (reloaded.metadata.width, reloaded.metadata.height),
        (loaded.metadata.width, loaded.metadata.height)
    );
}

#[test]
fn animated_gif_loads_every_frame() {
    let ws = Workspace::new();
    write_gif(&ws.input("anim.gif"), 2, 10, 8);
    let config = NodeConfig::default();
    let loaded = Loader::new(&ws.host, &config).load("anim.gif").unwrap();
    assert_eq!(loaded.frame_count(), 2);
    assert_eq!(loaded.masks.len(), 2);
    // Opaque GIF frames carry no transparent index.
    assert_eq!(loaded.masks[0].dimensions(), (64, 64));
}

#[test]
fn multi_page_tiff_stacks_matching_pages() {
    let ws = Workspace::new();
    let file = std::io::BufWriter::new(std::fs::File::create(ws.input("scan.tiff")).unwrap());
    let mut encoder = tiff::encoder::TiffEncoder::new(file).unwrap();
    for (w, h) in [(5, 3), (5, 3), (3, 5)] {
        let page = RgbImage::from_pixel(w, h, Rgb([40, 80, 120]));
        encoder
            .write_image::<tiff::encoder::colortype::RGB8>(w, h, page.as_raw())
            .unwrap();
    }
    drop(encoder);

    let config = NodeConfig::default();
    let loaded = Loader::new(&ws.host, &config).load("scan.tiff").unwrap();
    assert_eq!(loaded.frame_count(), 2);
    assert!(loaded.frames.iter().all(|f| f.dimensions() == (5, 3)));
}

#[test]
fn opaque_rgba_png_gives_full_size_zero_mask() {
    let ws = Workspace::new();
    RgbaImage::from_pixel(9, 4, Rgba([1, 2, 3, 255]))
        .save(ws.input("opaque.png"))
        .unwrap();
    let config = NodeConfig::default();
    let loaded = Loader::new(&ws.host, &config).load("opaque.png").unwrap();
    let mask = &loaded.masks[0];
    assert_eq!(mask.dimensions(), (9, 4));
    assert!(mask.pixels().all(|p| p.0[0] == 0.0));
}

#[test]
fn rgb_png_gives_placeholder_mask() {
    let ws = Workspace::new();
    write_rgb_png(&ws.input("rgb.png"), 200, 100);
    let config = NodeConfig::default();
    let loaded = Loader::new(&ws.host, &config).load("rgb.png").unwrap();
    let mask = &loaded.masks[0];
    assert_eq!(mask.dimensions(), (64, 64));
    assert!(mask.pixels().all(|p| p.0[0] == 0.0));
}

#[test]
fn missing_input_fails_and_validation_reports_it() {
    let ws = Workspace::new();
    let config = NodeConfig::default();
    let loader = Loader::new(&ws.host, &config);
    assert!(matches!(loader.load("ghost.png"), Err(NodeError::FileNotFound(_))));
    assert_eq!(
        loader.validate("ghost.png").unwrap_err().to_string(),
        "Invalid image file: ghost.png"
    );
}

#[test]
fn list_inputs_filters_and_sorts() {
    let ws = Workspace::new();
    write_rgb_png(&ws.input("b.png"), 2, 2);
    write_rgb_png(&ws.input("a.png"), 2, 2);
    std::fs::write(ws.input("notes.txt"), "hi").unwrap();
    let config = NodeConfig::default();
    assert_eq!(
        Loader::new(&ws.host, &config).list_inputs().unwrap(),
        ["a.png", "b.png"]
    );
}

// =============================================================================
// Fingerprint
// =============================================================================

#[test]
fn fingerprint_tracks_content() {
    let ws = Workspace::new();
    let config = NodeConfig::default();
    let loader = Loader::new(&ws.host, &config);

    std::fs::write(ws.input("a.bin.png"), b"same bytes").unwrap();
    std::fs::write(ws.input("b.bin.png"), b"same bytes").unwrap();
    let a = loader.fingerprint("a.bin.png").unwrap();
    assert_eq!(a, loader.fingerprint("b.bin.png").unwrap());

    std::fs::write(ws.input("b.bin.png"), b"same bytez").unwrap();
    assert_ne!(a, loader.fingerprint("b.bin.png").unwrap());
}

// =============================================================================
// Saver properties
// =============================================================================

#[test]
fn saving_twice_yields_distinct_files() {
    let ws = Workspace::new();
    let config = NodeConfig::default();
    let saver = Saver::new(&ws.host, &config);
    let request = SaveRequest {
        frames: vec![image_with_info::types::Frame::new(4, 4)],
        format: TargetFormat::Jpg,
        quality: Quality::new(0),
        ..Default::default()
    };
    let first = saver.save(&request).unwrap();
    let second = saver.save(&request).unwrap();
    assert_ne!(first.files[0], second.files[0]);
    assert!(first.files[0].exists() && second.files[0].exists());
    assert_eq!(ws.host.registered_outputs().len(), 2);
}

#[test]
fn jpeg_roundtrip_keeps_exif_and_dpi() {
    let ws = Workspace::new();
    let config = NodeConfig::default();
    let request = SaveRequest {
        frames: vec![image_with_info::types::Frame::new(16, 12)],
        filename: "tagged".into(),
        format: TargetFormat::Jpg,
        dpi: 240,
        exif: r#"{"Artist": "Ada", "Software": "image-with-info"}"#.into(),
        ..Default::default()
    };
    let outcome = Saver::new(&ws.host, &config).save(&request).unwrap();
    assert!(outcome.dropped_exif.is_empty());

    let loaded = Loader::new(&ws.host, &config)
        .load("tagged.jpg [output]")
        .unwrap();
    assert_eq!(loaded.metadata.dpi, 240);
    assert_eq!(loaded.metadata.exif["Artist"], "Ada");
    assert_eq!(loaded.metadata.exif["Software"], "image-with-info");
}

#[test]
fn legacy_revision_overwrites() {
    let ws = Workspace::new();
    let config = NodeConfig {
        revision: TableRevision::V1,
        ..Default::default()
    };
    let saver = Saver::new(&ws.host, &config);
    let request = SaveRequest {
        frames: vec![image_with_info::types::Frame::new(4, 4)],
        format: TargetFormat::Png,
        ..Default::default()
    };
    let first = saver.save(&request).unwrap();
    let second = saver.save(&request).unwrap();
    assert_eq!(first.files, second.files);
    assert_eq!(first.filename, "image.png");
}
