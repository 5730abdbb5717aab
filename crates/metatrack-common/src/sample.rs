//! Timed metadata samples.

use crate::MediaTime;
use bytes::Bytes;

/// An application-defined metadata payload stamped with its presentation time.
///
/// Immutable once constructed; the payload is reference counted so samples
/// are cheap to clone between the capture buffer, the muxer, and playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedSample {
    payload: Bytes,
    presentation_time: MediaTime,
}

impl TimedSample {
    pub fn new(payload: impl Into<Bytes>, presentation_time: MediaTime) -> Self {
        Self {
            payload: payload.into(),
            presentation_time,
        }
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn presentation_time(&self) -> MediaTime {
        self.presentation_time
    }

    /// Split into payload and timestamp.
    pub fn into_parts(self) -> (Bytes, MediaTime) {
        (self.payload, self.presentation_time)
    }
}
