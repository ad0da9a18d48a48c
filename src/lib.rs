//! # Image With Info
//!
//! Image loader and saver nodes for node-graph image hosts. The loader hands
//! the graph pixels *and* what the file says about them (DPI, EXIF, size,
//! format); the saver writes pixels back with that metadata re-embedded.
//!
//! # Architecture: Two Nodes Behind One Seam
//!
//! ```text
//! reference ─► Loader ─► frames + masks + ImageMetadata ─► … graph … ─► Saver ─► files
//!                 ▲                                                        │
//!                 └──────── Host: resolve / list inputs / register ◄───────┘
//! ```
//!
//! Nodes never touch host internals. Everything host-specific goes through
//! the [`host::Host`] trait; [`host::DirectoryHost`] is the plain-directory
//! implementation the CLI uses, and tests use a recording mock.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`loader`] | Image Loader node: decode, orient, normalize, mask, metadata |
//! | [`saver`] | Image Saver node: naming, fallback chain, archive copies |
//! | [`metadata`] | Best-effort DPI and EXIF probes |
//! | [`imaging`] | Frame decoding, the save decision table, per-format writers |
//! | [`host`] | The host seam and its directory implementation |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`nodes`] | Node descriptors for the host UI |
//! | [`naming`] | Basename splitting, reference annotations, collision-free paths |
//! | [`fingerprint`] | Content hash for change detection |
//! | [`types`] | Frames, masks, metadata and probe results |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Saver, Revisioned Table
//!
//! The saver shipped in several historical variants that differed in how
//! "quality" maps onto each encoder, how files are named and whether a PNG
//! copy is archived. They are one component here, driven by
//! [`imaging::TableRevision`]: `v1` reproduces the legacy behavior, `v2` is
//! the current one and the default. The decision table itself is a pure
//! function ([`imaging::plan`]) so every cell is unit tested without I/O.
//!
//! ## Metadata Never Fails a Load
//!
//! A photo with a broken EXIF block is still a photo. DPI and EXIF probes
//! return [`types::MetadataProbe`] (present / absent / malformed); the
//! loader reports a default and keeps going, and the probe result is kept in
//! [`types::MetadataDiagnostics`] so callers can tell the cases apart.
//!
//! ## Inverted Masks
//!
//! Masks are `1 − alpha`: `1.0` marks a fully transparent pixel. Images
//! without transparency get a fixed 64×64 zero mask rather than a full-size
//! one; downstream nodes rely on both conventions.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod host;
pub mod imaging;
pub mod loader;
pub mod metadata;
pub mod naming;
pub mod nodes;
pub mod output;
pub mod saver;
pub mod types;

pub use error::{NodeError, Result, ValidationError};
pub use host::{DirectoryHost, Host};
pub use loader::Loader;
pub use saver::{SaveOutcome, SaveRequest, Saver, TargetFormat};

#[cfg(test)]
pub(crate) mod test_helpers;
