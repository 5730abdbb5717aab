//! Error types for metatrack-media.

use std::io;
use thiserror::Error;

/// Result type for metatrack-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for metatrack-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid MP4 file structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required atom in MP4 file.
    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),

    /// Samples handed to the muxer are not sorted by presentation time.
    #[error("{track} samples out of order at index {index}")]
    UnsortedSamples { track: &'static str, index: usize },

    /// A timestamp or size does not fit the container field that stores it.
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Timestamp conversion failed.
    #[error(transparent)]
    Time(#[from] metatrack_common::Error),
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create an out-of-range error.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }
}
