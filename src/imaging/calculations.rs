//! The save decision table: pure functions from a request to encoder settings.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! | target | `v1` (legacy) | `v2` (current) |
//! |---|---|---|
//! | png | level = clamp(9 − ⌊q/11⌋, 0, 9) | configured level (default 4) |
//! | avif | quality q | q=100 → lossless; q=0 → default; q above default → default |
//! | webp | quality q, lossy | q=100 → lossless; q=0 → default |
//! | jpg | quality q | q=0 → default |
//! | tiff | generic encoder | default codec |
//! | other | generic encoder, PNG fallback | same |
//!
//! PNG compression level trades time for size, never visual quality, so the
//! legacy inverse mapping from "quality" only changed encode speed.

use super::params::{EncodePlan, Encoding, Quality, TableRevision};
use crate::config::SaverConfig;

/// Legacy mapping from quality to zlib level: high quality → low level.
///
/// # Examples
/// ```
/// # use image_with_info::imaging::{png_level_from_quality, Quality};
/// assert_eq!(png_level_from_quality(Quality::new(100)), 0);
/// assert_eq!(png_level_from_quality(Quality::new(1)), 9);
/// ```
pub fn png_level_from_quality(quality: Quality) -> u8 {
    9u8.saturating_sub(quality.value() / 11).min(9)
}

/// PNG level used for the PNG branch and for the generic-encoder fallback.
pub fn png_level(revision: TableRevision, quality: Quality, saver: &SaverConfig) -> u8 {
    match revision {
        TableRevision::V1 => png_level_from_quality(quality),
        TableRevision::V2 => saver.png_compress_level.min(9),
    }
}

/// Resolve encoder settings for `encoding` at the requested `quality`.
pub fn plan(
    revision: TableRevision,
    encoding: &Encoding,
    quality: Quality,
    saver: &SaverConfig,
) -> EncodePlan {
    let q = quality.value();
    match (revision, encoding) {
        (_, Encoding::Png) => EncodePlan::Png {
            compress_level: png_level(revision, quality, saver),
        },
        (TableRevision::V1, Encoding::Avif) => EncodePlan::Avif {
            lossless: false,
            quality: Some(q),
        },
        (TableRevision::V1, Encoding::Webp) => EncodePlan::Webp {
            lossless: false,
            quality: Some(q),
        },
        (TableRevision::V1, Encoding::Jpeg) => EncodePlan::Jpeg { quality: q },
        (TableRevision::V1, Encoding::Tiff) => EncodePlan::Other {
            format: "tiff".to_string(),
            quality: q,
        },
        (TableRevision::V2, Encoding::Avif) => match q {
            100 => EncodePlan::Avif {
                lossless: true,
                quality: None,
            },
            0 => EncodePlan::Avif {
                lossless: false,
                quality: Some(saver.avif_default_quality),
            },
            q => EncodePlan::Avif {
                lossless: false,
                quality: Some(q.min(saver.avif_default_quality)),
            },
        },
        (TableRevision::V2, Encoding::Webp) => match q {
            100 => EncodePlan::Webp {
                lossless: true,
                quality: None,
            },
            0 => EncodePlan::Webp {
                lossless: false,
                quality: Some(saver.webp_default_quality),
            },
            q => EncodePlan::Webp {
                lossless: false,
                quality: Some(q),
            },
        },
        (TableRevision::V2, Encoding::Jpeg) => EncodePlan::Jpeg {
            quality: if q == 0 { saver.jpeg_default_quality } else { q },
        },
        (TableRevision::V2, Encoding::Tiff) => EncodePlan::Tiff,
        (_, Encoding::Other(name)) => EncodePlan::Other {
            format: name.clone(),
            quality: q,
        },
    }
}

/// `"<filename>.<ext>"`, unless `filename` already ends with `".<ext>"`.
pub fn base_filename(filename: &str, ext: &str) -> String {
    let suffix = format!(".{ext}");
    if filename.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase()) {
        filename.to_string()
    } else {
        format!("{filename}{suffix}")
    }
}

/// Legacy per-frame file name: the first frame keeps the base name, later
/// frames become `<filename>_<i>.<ext>`.
pub fn legacy_frame_filename(filename: &str, ext: &str, index: usize) -> String {
    if index == 0 {
        base_filename(filename, ext)
    } else {
        format!("{filename}_{index}.{ext}")
    }
}

/// Legacy PNG fallback name: `<filename>_<i>.png`, with an empty index for
/// the first frame (so frame 0 is `<filename>_.png`).
pub fn legacy_fallback_filename(filename: &str, index: usize) -> String {
    if index == 0 {
        format!("{filename}_.png")
    } else {
        format!("{filename}_{index}.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saver() -> SaverConfig {
        SaverConfig::default()
    }

    // =========================================================================
    // PNG level
    // =========================================================================

    #[test]
    fn legacy_png_level_inverts_quality() {
        assert_eq!(png_level_from_quality(Quality::new(100)), 0);
        assert_eq!(png_level_from_quality(Quality::new(99)), 0);
        assert_eq!(png_level_from_quality(Quality::new(98)), 1);
        assert_eq!(png_level_from_quality(Quality::new(50)), 5);
        assert_eq!(png_level_from_quality(Quality::new(10)), 9);
        assert_eq!(png_level_from_quality(Quality::new(1)), 9);
        assert_eq!(png_level_from_quality(Quality::new(0)), 9);
    }

    #[test]
    fn v1_png_plan_uses_quality() {
        let p = plan(TableRevision::V1, &Encoding::Png, Quality::new(100), &saver());
        assert_eq!(p, EncodePlan::Png { compress_level: 0 });
        let p = plan(TableRevision::V1, &Encoding::Png, Quality::new(1), &saver());
        assert_eq!(p, EncodePlan::Png { compress_level: 9 });
    }

    #[test]
    fn v2_png_plan_ignores_quality() {
        for q in [0, 1, 50, 100] {
            let p = plan(TableRevision::V2, &Encoding::Png, Quality::new(q), &saver());
            assert_eq!(p, EncodePlan::Png { compress_level: 4 });
        }
        let mut custom = saver();
        custom.png_compress_level = 7;
        let p = plan(TableRevision::V2, &Encoding::Png, Quality::new(3), &custom);
        assert_eq!(p, EncodePlan::Png { compress_level: 7 });
    }

    // =========================================================================
    // AVIF / WebP / JPEG
    // =========================================================================

    #[test]
    fn v2_avif_rules() {
        let cfg = saver();
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Avif, Quality::new(100), &cfg),
            EncodePlan::Avif {
                lossless: true,
                quality: None
            }
        );
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Avif, Quality::new(0), &cfg),
            EncodePlan::Avif {
                lossless: false,
                quality: Some(80)
            }
        );
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Avif, Quality::new(95), &cfg),
            EncodePlan::Avif {
                lossless: false,
                quality: Some(80)
            }
        );
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Avif, Quality::new(60), &cfg),
            EncodePlan::Avif {
                lossless: false,
                quality: Some(60)
            }
        );
    }

    #[test]
    fn v1_avif_passes_quality_through() {
        assert_eq!(
            plan(TableRevision::V1, &Encoding::Avif, Quality::new(95), &saver()),
            EncodePlan::Avif {
                lossless: false,
                quality: Some(95)
            }
        );
    }

    #[test]
    fn v2_webp_rules() {
        let cfg = saver();
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Webp, Quality::new(100), &cfg),
            EncodePlan::Webp {
                lossless: true,
                quality: None
            }
        );
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Webp, Quality::new(0), &cfg),
            EncodePlan::Webp {
                lossless: false,
                quality: Some(95)
            }
        );
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Webp, Quality::new(42), &cfg),
            EncodePlan::Webp {
                lossless: false,
                quality: Some(42)
            }
        );
    }

    #[test]
    fn v1_webp_is_always_lossy() {
        assert_eq!(
            plan(TableRevision::V1, &Encoding::Webp, Quality::new(100), &saver()),
            EncodePlan::Webp {
                lossless: false,
                quality: Some(100)
            }
        );
    }

    #[test]
    fn jpeg_zero_quality_uses_default_in_v2_only() {
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Jpeg, Quality::new(0), &saver()),
            EncodePlan::Jpeg { quality: 95 }
        );
        assert_eq!(
            plan(TableRevision::V1, &Encoding::Jpeg, Quality::new(0), &saver()),
            EncodePlan::Jpeg { quality: 0 }
        );
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Jpeg, Quality::new(70), &saver()),
            EncodePlan::Jpeg { quality: 70 }
        );
    }

    // =========================================================================
    // TIFF / other
    // =========================================================================

    #[test]
    fn tiff_has_dedicated_branch_in_v2() {
        assert_eq!(
            plan(TableRevision::V2, &Encoding::Tiff, Quality::new(90), &saver()),
            EncodePlan::Tiff
        );
        assert_eq!(
            plan(TableRevision::V1, &Encoding::Tiff, Quality::new(90), &saver()),
            EncodePlan::Other {
                format: "tiff".into(),
                quality: 90
            }
        );
    }

    #[test]
    fn unknown_encoding_goes_generic() {
        let p = plan(
            TableRevision::V2,
            &Encoding::from_name("BMP"),
            Quality::new(90),
            &saver(),
        );
        assert_eq!(
            p,
            EncodePlan::Other {
                format: "bmp".into(),
                quality: 90
            }
        );
    }

    #[test]
    fn fallback_level_follows_revision() {
        assert_eq!(png_level(TableRevision::V1, Quality::new(100), &saver()), 0);
        assert_eq!(png_level(TableRevision::V2, Quality::new(100), &saver()), 4);
    }

    // =========================================================================
    // Filenames
    // =========================================================================

    #[test]
    fn base_filename_appends_extension_once() {
        assert_eq!(base_filename("image", "png"), "image.png");
        assert_eq!(base_filename("image.png", "png"), "image.png");
        assert_eq!(base_filename("IMAGE.PNG", "png"), "IMAGE.PNG");
        assert_eq!(base_filename("image.jpg", "png"), "image.jpg.png");
    }

    #[test]
    fn legacy_batch_names() {
        assert_eq!(legacy_frame_filename("shot", "jpg", 0), "shot.jpg");
        assert_eq!(legacy_frame_filename("shot", "jpg", 2), "shot_2.jpg");
        assert_eq!(legacy_fallback_filename("shot", 0), "shot_.png");
        assert_eq!(legacy_fallback_filename("shot", 3), "shot_3.png");
    }
}
