//! Error types shared by the loader and saver nodes.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors that abort a load or save.
///
/// Metadata problems (DPI, EXIF) never show up here: they are defaulted and
/// reported through [`crate::types::MetadataProbe`].
#[derive(Error, Debug)]
pub enum NodeError {
    /// The reference did not resolve to an existing file.
    #[error("Image file not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file exists but its pixel data could not be decoded.
    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// An encoder rejected the frame and no fallback applied.
    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl NodeError {
    pub(crate) fn decode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        NodeError::Decode {
            path: path.into(),
            source,
        }
    }
}

impl From<crate::imaging::WriteError> for NodeError {
    fn from(err: crate::imaging::WriteError) -> Self {
        use crate::imaging::WriteError;
        match err {
            WriteError::Io(e) => NodeError::Io(e),
            WriteError::Unsupported(format) => NodeError::UnsupportedFormat(format),
            other => NodeError::Encode(other.to_string()),
        }
    }
}

/// Returned by the validation hook when a reference does not resolve.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid image file: {reference}")]
pub struct ValidationError {
    pub reference: String,
}
