//! State-transition and capture notifications for the UI layer.

use crate::capture::CapturePhase;
use chrono::{DateTime, Utc};
use metatrack_common::AssetId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// The coordinator entered a new phase.
    StateChanged {
        phase: CapturePhase,
        at: DateTime<Utc>,
    },
    /// The coordinator entered `Failed`.
    Failed { cause: String, at: DateTime<Utc> },
    /// A finished recording was handed to the asset store.
    AssetStored { asset_id: AssetId, at: DateTime<Utc> },
    /// A metadata event was not enqueued.
    MetadataRejected { reason: String, at: DateTime<Utc> },
}

impl CaptureEvent {
    pub fn state_changed(phase: CapturePhase) -> Self {
        Self::StateChanged {
            phase,
            at: Utc::now(),
        }
    }

    pub fn failed(cause: impl Into<String>) -> Self {
        Self::Failed {
            cause: cause.into(),
            at: Utc::now(),
        }
    }

    pub fn asset_stored(asset_id: AssetId) -> Self {
        Self::AssetStored {
            asset_id,
            at: Utc::now(),
        }
    }

    pub fn metadata_rejected(reason: impl Into<String>) -> Self {
        Self::MetadataRejected {
            reason: reason.into(),
            at: Utc::now(),
        }
    }

    /// When the event was raised.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StateChanged { at, .. }
            | Self::Failed { at, .. }
            | Self::AssetStored { at, .. }
            | Self::MetadataRejected { at, .. } => *at,
        }
    }
}

/// Fan-out of [`CaptureEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CaptureEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: CaptureEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag() {
        let event = CaptureEvent::state_changed(CapturePhase::Recording);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "state_changed");
        assert_eq!(json["phase"], "recording");
    }

    #[test]
    fn test_round_trip_through_json() {
        let event = CaptureEvent::failed("disk full");
        let json = serde_json::to_string(&event).unwrap();
        let back: CaptureEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_publish_to_subscribers() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(CaptureEvent::metadata_rejected("full"));

        assert!(matches!(first.recv().await.unwrap(), CaptureEvent::MetadataRejected { .. }));
        assert!(matches!(second.recv().await.unwrap(), CaptureEvent::MetadataRejected { .. }));
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::new().publish(CaptureEvent::failed("nobody listening"));
    }
}
