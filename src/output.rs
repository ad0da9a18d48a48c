//! CLI output formatting for every subcommand.
//!
//! # Information-First Display
//!
//! The primary line for an image is what it *is* (name, format, size); paths
//! and per-field detail follow as indented context lines. Machine-readable
//! output (`load --json`, `nodes`) is plain JSON instead.
//!
//! # Output Format
//!
//! ## Load
//!
//! ```text
//! dawn.jpg (4000×3000, 2 frames)
//!     DPI: 300
//!     Size: 2481137 bytes
//!     EXIF: 14 fields
//!         Make: Canon
//! ```
//!
//! ## Save
//!
//! ```text
//! Saved dawn.avif
//!     output/dawn.avif
//!     Archived: output/PNG/dawn.png
//!     Dropped EXIF: MakerNote
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::nodes::NodeDescriptor;
use crate::saver::SaveOutcome;
use crate::types::{LoadedImage, MetadataProbe};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Probe status as shown next to a defaulted value.
fn probe_note<T>(probe: &MetadataProbe<T>) -> Option<String> {
    match probe {
        MetadataProbe::Present(_) => None,
        MetadataProbe::Absent => Some("not in file, default".to_string()),
        MetadataProbe::Malformed(reason) => Some(format!("unreadable ({reason}), default")),
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Load
// ============================================================================

/// Format a loaded image: header, then metadata context lines.
pub fn format_load_output(loaded: &LoadedImage) -> Vec<String> {
    let meta = &loaded.metadata;
    let mut lines = vec![format!(
        "{}.{} ({}×{}, {})",
        meta.filename,
        meta.format,
        meta.width,
        meta.height,
        plural(loaded.frame_count(), "frame")
    )];

    match probe_note(&loaded.diagnostics.dpi) {
        Some(note) => lines.push(format!("{}DPI: {} ({})", indent(1), meta.dpi, note)),
        None => lines.push(format!("{}DPI: {}", indent(1), meta.dpi)),
    }
    lines.push(format!("{}Size: {} bytes", indent(1), meta.file_size));

    if let MetadataProbe::Malformed(reason) = &loaded.diagnostics.exif {
        lines.push(format!("{}EXIF: unreadable ({reason})", indent(1)));
    } else if meta.exif.is_empty() {
        lines.push(format!("{}EXIF: none", indent(1)));
    } else {
        lines.push(format!("{}EXIF: {}", indent(1), plural(meta.exif.len(), "field")));
        for (name, value) in &meta.exif {
            lines.push(format!("{}{}: {}", indent(2), name, value));
        }
    }

    let mask = &loaded.masks[0];
    if loaded.frames[0].dimensions() != mask.dimensions() {
        lines.push(format!("{}Mask: none (placeholder)", indent(1)));
    }
    lines
}

pub fn print_load_output(loaded: &LoadedImage) {
    print_lines(format_load_output(loaded));
}

// ============================================================================
// Save
// ============================================================================

pub fn format_save_output(outcome: &SaveOutcome) -> Vec<String> {
    let mut lines = vec![format!("Saved {}", outcome.filename)];
    for path in &outcome.files {
        lines.push(format!("{}{}", indent(1), path.display()));
    }
    for path in &outcome.archived {
        lines.push(format!("{}Archived: {}", indent(1), path.display()));
    }
    if !outcome.dropped_exif.is_empty() {
        lines.push(format!(
            "{}Dropped EXIF: {}",
            indent(1),
            outcome.dropped_exif.join(", ")
        ));
    }
    lines
}

pub fn print_save_output(outcome: &SaveOutcome) {
    print_lines(format_save_output(outcome));
}

// ============================================================================
// Inputs and nodes
// ============================================================================

/// One file name per line under the input directory header.
pub fn format_input_list(input_dir: &Path, names: &[String]) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", input_dir.display(), plural(names.len(), "image"))];
    lines.extend(names.iter().map(|n| format!("{}{}", indent(1), n)));
    lines
}

pub fn print_input_list(input_dir: &Path, names: &[String]) {
    print_lines(format_input_list(input_dir, names));
}

/// Node summary: class, display name, then one line per socket.
pub fn format_node_list(nodes: &[NodeDescriptor]) -> Vec<String> {
    let mut lines = Vec::new();
    for node in nodes {
        lines.push(format!("{} ({})", node.class_name, node.display_name));
        for input in node.inputs.iter().filter(|i| !i.hidden) {
            lines.push(format!("{}in  {}", indent(1), input.name));
        }
        for output in &node.outputs {
            lines.push(format!("{}out {}", indent(1), output.name));
        }
    }
    lines
}
