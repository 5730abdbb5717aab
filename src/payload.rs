//! Typed metadata payloads.
//!
//! The metadata track carries opaque bytes. These helpers encode the kinds
//! of events a camera app typically records as JSON, matching the default
//! `application/json` MIME format of the track.

use crate::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Normalized rectangle, origin top-left, all fields in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataPayload {
    /// Location fix.
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        altitude: Option<f64>,
    },
    /// A face seen in the frame.
    DetectedFace { face_id: i64, bounds: Bounds },
    /// Free-form note.
    Annotation { text: String },
}

impl MetadataPayload {
    pub fn location(latitude: f64, longitude: f64) -> Self {
        Self::Location {
            latitude,
            longitude,
            altitude: None,
        }
    }

    pub fn annotation(text: impl Into<String>) -> Self {
        Self::Annotation { text: text.into() }
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Short human-readable form for logs and the CLI.
    pub fn summary(&self) -> String {
        match self {
            Self::Location {
                latitude,
                longitude,
                altitude: Some(alt),
            } => format!("location {:.5},{:.5} @ {:.1}m", latitude, longitude, alt),
            Self::Location {
                latitude, longitude, ..
            } => format!("location {:.5},{:.5}", latitude, longitude),
            Self::DetectedFace { face_id, bounds } => format!(
                "face #{} at ({:.2},{:.2}) {:.2}x{:.2}",
                face_id, bounds.x, bounds.y, bounds.width, bounds.height
            ),
            Self::Annotation { text } => format!("note: {}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_json_shape() {
        let payload = MetadataPayload::location(37.33, -122.03);
        let json: serde_json::Value = serde_json::from_slice(&payload.to_bytes().unwrap()).unwrap();
        assert_eq!(json["type"], "location");
        assert!(json.get("altitude").is_none());
    }

    #[test]
    fn test_from_bytes() {
        let data = br#"{"type":"detected_face","face_id":3,"bounds":{"x":0.1,"y":0.2,"width":0.3,"height":0.4}}"#;
        let payload = MetadataPayload::from_bytes(data).unwrap();
        assert_matches!(payload, MetadataPayload::DetectedFace { face_id: 3, .. });
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert_matches!(
            MetadataPayload::from_bytes(b"\x00\x01"),
            Err(crate::Error::Payload(_))
        );
    }

    #[test]
    fn test_summary() {
        assert_eq!(MetadataPayload::annotation("hi").summary(), "note: hi");
    }
}
