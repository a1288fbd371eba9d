//! Error types for staff detection and symbol segmentation.
//!
//! Only conditions the caller has to act on are errors. An empty page, a staff
//! without contours or a degenerate area distribution produce empty results
//! instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentError {
    /// The input file is missing or could not be decoded.
    #[error("failed to load image {}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A tunable parameter is out of range.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// An output image could not be encoded or written.
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A configuration file is not valid JSON for `SegmenterConfig`.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Listing inputs or writing the manifest failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SegmentError {
    pub fn config(message: impl Into<String>) -> Self {
        SegmentError::Config {
            message: message.into(),
        }
    }

    /// Returns true when the error only concerns a single input file.
    pub fn is_image_load(&self) -> bool {
        matches!(self, SegmentError::ImageLoad { .. })
    }
}

pub type Result<T> = std::result::Result<T, SegmentError>;
