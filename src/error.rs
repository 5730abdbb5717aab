//! Error types for capture, playback and asset storage.

use crate::capture::CapturePhase;
use metatrack_common::{AssetId, MediaTime};
use thiserror::Error;

/// Result type for metatrack operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The time base was misused, e.g. queried before the session epoch.
    #[error(transparent)]
    Clock(#[from] metatrack_common::Error),

    /// A sample arrived with a presentation time earlier than its predecessor.
    #[error("Out of order: {got} precedes last accepted time {last}")]
    OutOfOrder { last: MediaTime, got: MediaTime },

    /// The metadata buffer is at capacity.
    #[error("Metadata buffer full ({capacity} samples)")]
    BufferFull { capacity: usize },

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Container write or read failure.
    #[error("Mux error: {0}")]
    Mux(#[from] metatrack_media::Error),

    /// Terminal capture failure. The coordinator must be replaced.
    #[error("Capture failed: {cause}")]
    Failed { cause: String },

    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        phase: CapturePhase,
        action: &'static str,
    },

    /// The video frame queue is full; the frame was not accepted.
    #[error("Video frame queue full")]
    FrameQueueFull,

    #[error("Asset not found: {0}")]
    NotFound(AssetId),

    #[error("Asset store error: {0}")]
    Store(String),

    /// Metadata payload (de)serialization failed.
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn failed(cause: impl Into<String>) -> Self {
        Self::Failed {
            cause: cause.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn device_unavailable(msg: impl Into<String>) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    /// Whether the caller may retry or drop the event and carry on.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BufferFull { .. } | Self::FrameQueueFull)
    }
}
