//! Filename conventions shared by the loader and the saver.
//!
//! ## Annotated References
//!
//! Host image references may carry a trailing directory annotation:
//! - `"photo.png"` → input directory
//! - `"photo.png [output]"` → output directory
//! - `"render_00001.png [temp]"` → temp directory
//!
//! ## Collision Avoidance
//!
//! [`next_free_path`] inserts `_1`, `_2`, … before the extension until the
//! path does not exist: `image.png` → `image_1.png` → `image_2.png`. The
//! check and the later create are separate steps, so two concurrent saves
//! with the same base name can still race.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Directory an annotated reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    Input,
    Output,
    Temp,
}

/// Split a trailing `[input]`/`[output]`/`[temp]` annotation off `reference`.
///
/// Whitespace between the name and the annotation is dropped. Unknown
/// bracketed suffixes are part of the name.
pub fn parse_annotation(reference: &str) -> (&str, Option<Annotation>) {
    let trimmed = reference.trim_end();
    for (tag, annotation) in [
        ("[input]", Annotation::Input),
        ("[output]", Annotation::Output),
        ("[temp]", Annotation::Temp),
    ] {
        if let Some(name) = trimmed.strip_suffix(tag) {
            return (name.trim_end(), Some(annotation));
        }
    }
    (reference, None)
}

/// Result of splitting a basename like `photo.JPG`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitName {
    /// Name without its final extension.
    pub stem: String,
    /// Lowercase extension without the dot; `"png"` when there is none.
    pub format: String,
}

/// Split the basename of `path` into stem and lowercase format.
///
/// - `"photo.JPG"` → stem `"photo"`, format `"jpg"`
/// - `"archive.tar.gz"` → stem `"archive.tar"`, format `"gz"`
/// - `"README"` → stem `"README"`, format `"png"`
pub fn split_name(path: &Path) -> SplitName {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let format = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "png".to_string());
    SplitName { stem, format }
}

/// Insert `suffix` between the file stem and the extension of `path`.
///
/// Appends to the end when there is no extension.
pub fn insert_suffix_before_extension(path: &Path, suffix: &str) -> PathBuf {
    let Some(file_name) = path.file_name() else {
        let mut raw = path.as_os_str().to_owned();
        raw.push(suffix);
        return PathBuf::from(raw);
    };
    let file_name = Path::new(file_name);
    let new_name = match file_name.extension() {
        Some(ext) => {
            let mut name = OsString::from(file_name.file_stem().unwrap_or_else(|| OsStr::new("")));
            name.push(suffix);
            name.push(".");
            name.push(ext);
            name
        }
        None => {
            let mut name = file_name.as_os_str().to_owned();
            name.push(suffix);
            name
        }
    };
    match path.parent() {
        Some(parent) => parent.join(new_name),
        None => PathBuf::from(new_name),
    }
}

/// First of `path`, `path_1`, `path_2`, … (suffix before the extension)
/// that does not exist yet.
pub fn next_free_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let mut counter: u32 = 1;
    loop {
        let candidate = insert_suffix_before_extension(path, &format!("_{counter}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
