//! EXIF orientation correction.
//!
//! Orientation values 1–8 describe how the stored pixels must be flipped
//! and rotated to display upright. See
//! <https://web.archive.org/web/20200412005226/https://www.impulseadventure.com/photo/exif-orientation.html>.

use image::DynamicImage;

/// Rotate/flip `image` so that it displays upright.
///
/// Values outside 1–8 leave the image untouched.
pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}
