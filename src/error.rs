//! Error types for the loading pipeline.
//!
//! Decode failures are recoverable by design of the pipeline: the caller gets
//! `None` and shows a placeholder. Store failures degrade to cache misses.
//! Only configuration errors are meant to stop the program.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a file into pixels
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported image format: {0}")]
    Unsupported(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("scaled JPEG decode failed: {0}")]
    Jpeg(#[from] jpeg_decoder::Error),

    #[error("raw decode failed: {0}")]
    Raw(String),

    #[error("no embedded preview found")]
    NoPreview,

    #[error("all {0} decode strategies failed")]
    Exhausted(usize),
}

impl DecodeError {
    /// Wrap an I/O error with the path that caused it
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure inside the persistent thumbnail store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("thumbnail encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("store connection lock poisoned")]
    Poisoned,
}

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
}
