//! The Image Loader node.
//!
//! Turns an image reference into frames, masks and [`ImageMetadata`]:
//!
//! ```text
//! reference ──Host::resolve_input──► path
//!     ├── split_name / file size / container metadata (DPI, EXIF, orientation)
//!     └── decode_frames ─► per frame: orient → normalize → mask → FrameCollector
//! ```
//!
//! Only a missing file or undecodable pixels fail a load. Metadata problems
//! are defaulted and reported in [`MetadataDiagnostics`].

use crate::config::NodeConfig;
use crate::error::{NodeError, Result, ValidationError};
use crate::fingerprint::hash_file;
use crate::host::Host;
use crate::imaging::frames::{
    FrameCollector, classify_alpha, decode_frames, derive_mask, png_alpha_source, to_rgb_frame,
};
use crate::imaging::{apply_orientation, detect_format};
use crate::metadata::read_container_metadata;
use crate::naming::split_name;
use crate::types::{ImageMetadata, LoadedImage, MetadataDiagnostics, MetadataProbe};
use image::{GenericImageView, ImageFormat};
use std::path::PathBuf;
use tracing::debug;

/// Names the stack exclusion list is matched against: the sniffed
/// container's extensions, `mpo` for JPEG streams with a Multi-Picture
/// index, and the file extension only when the content was not recognized.
fn container_format_names(
    format: Option<ImageFormat>,
    multi_picture: bool,
    extension: &str,
) -> Vec<String> {
    let mut names: Vec<String> = match format {
        Some(format) => format.extensions_str().iter().map(|e| e.to_string()).collect(),
        None => vec![extension.to_string()],
    };
    if multi_picture {
        names.push("mpo".to_string());
    }
    names
}

/// Image Loader bound to a host and a configuration.
pub struct Loader<'a, H: Host + ?Sized> {
    host: &'a H,
    config: &'a NodeConfig,
}

impl<'a, H: Host + ?Sized> Loader<'a, H> {
    pub fn new(host: &'a H, config: &'a NodeConfig) -> Self {
        Self { host, config }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        self.host
            .resolve_input(reference)
            .filter(|p| p.is_file())
            .ok_or_else(|| NodeError::FileNotFound(reference.to_string()))
    }

    /// Load every frame of `reference` with its metadata.
    pub fn load(&self, reference: &str) -> Result<LoadedImage> {
        let path = self.resolve(reference)?;
        let name = split_name(&path);
        let file_size = std::fs::metadata(&path)?.len();
        let format = detect_format(&path);

        let container = read_container_metadata(&path, format);
        let default_dpi = self.config.default_dpi();
        if let MetadataProbe::Malformed(reason) = &container.dpi {
            debug!(path = %path.display(), %reason, default_dpi, "DPI unreadable, using default");
        }
        let dpi = container.dpi.clone().value_or(default_dpi);
        if let MetadataProbe::Malformed(reason) = &container.exif_probe {
            debug!(path = %path.display(), %reason, "EXIF unreadable, reporting none");
        }

        let decoded = decode_frames(&path, format).map_err(|e| NodeError::decode(&path, e))?;
        let (width, height) = decoded
            .frames
            .first()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0));
        let declared_alpha = decoded
            .declared_alpha
            .or_else(|| container.png.as_ref().map(png_alpha_source));

        let orientation = container.orientation.unwrap_or(1);
        let mut collector = FrameCollector::new();
        for frame in decoded.frames {
            let frame = apply_orientation(frame, orientation);
            let alpha = classify_alpha(&frame, declared_alpha);
            let mask = derive_mask(&frame, alpha);
            collector.push(to_rgb_frame(&frame), mask);
        }

        let container_names = container_format_names(format, container.multi_picture, &name.format);
        let stack = !self
            .config
            .loader
            .excluded_stack_formats
            .iter()
            .any(|f| container_names.iter().any(|n| f.eq_ignore_ascii_case(n)));
        debug!(
            path = %path.display(),
            accepted = collector.accepted(),
            skipped = collector.skipped(),
            stack,
            "collected frames"
        );
        let (frames, masks) = collector.finish(stack).ok_or_else(|| {
            NodeError::decode(
                &path,
                image::ImageError::IoError(std::io::Error::other("container holds no frames")),
            )
        })?;
        debug!(path = %path.display(), frames = frames.len(), "loaded image");

        Ok(LoadedImage {
            frames,
            masks,
            metadata: ImageMetadata {
                filename: name.stem,
                format: name.format,
                dpi,
                width,
                height,
                long_edge: width.max(height),
                short_edge: width.min(height),
                file_size,
                exif: container.exif,
            },
            diagnostics: MetadataDiagnostics {
                dpi: container.dpi,
                exif: container.exif_probe,
            },
        })
    }

    /// Change-detection hook: SHA-256 of the referenced file, lowercase hex.
    pub fn fingerprint(&self, reference: &str) -> Result<String> {
        let path = self.resolve(reference)?;
        Ok(hash_file(&path)?)
    }

    /// Validation hook: the reference must resolve to an existing file.
    pub fn validate(&self, reference: &str) -> std::result::Result<(), ValidationError> {
        if self.host.input_exists(reference) {
            Ok(())
        } else {
            Err(ValidationError {
                reference: reference.to_string(),
            })
        }
    }

    /// Files the user may pick, sorted by name.
    pub fn list_inputs(&self) -> Result<Vec<String>> {
        Ok(self.host.list_inputs()?)
    }
}
