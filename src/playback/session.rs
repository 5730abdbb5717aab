use super::{MetadataTrack, PlaybackSynchronizer};
use metatrack_common::{MediaTime, TimedSample};
use metatrack_media::MuxedAsset;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Intent forwarded from the player surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "time", rename_all = "snake_case")]
pub enum PlayerEvent {
    Play,
    Pause,
    /// The video's current presentation time moved to the given time.
    Advance(MediaTime),
    /// The user scrubbed to the given time.
    Seek(MediaTime),
}

/// One viewer's playback of an asset: play/pause state around a cursor.
#[derive(Debug)]
pub struct PlaybackSession<T: ?Sized = MuxedAsset> {
    sync: PlaybackSynchronizer<T>,
    playing: bool,
}

impl<T: MetadataTrack + ?Sized> PlaybackSession<T> {
    /// A paused session at time zero.
    pub fn new(sync: PlaybackSynchronizer<T>) -> Self {
        Self {
            sync,
            playing: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn synchronizer(&self) -> &PlaybackSynchronizer<T> {
        &self.sync
    }

    pub fn into_synchronizer(self) -> PlaybackSynchronizer<T> {
        self.sync
    }

    /// Apply one event. Advances are ignored while paused; seeks always
    /// apply. Returns the number of samples delivered.
    pub fn handle<F>(&mut self, event: PlayerEvent, deliver: F) -> usize
    where
        F: FnMut(&TimedSample),
    {
        match event {
            PlayerEvent::Play => {
                self.playing = true;
                0
            }
            PlayerEvent::Pause => {
                self.playing = false;
                0
            }
            PlayerEvent::Advance(time) if self.playing => self.sync.advance_to(time, deliver),
            PlayerEvent::Advance(time) => {
                debug!(time = %time, "Ignoring advance while paused");
                0
            }
            PlayerEvent::Seek(time) => {
                self.sync.seek(time);
                0
            }
        }
    }

    /// Consume events until the channel closes, then return the session.
    pub async fn run<F>(mut self, mut events: mpsc::Receiver<PlayerEvent>, mut deliver: F) -> Self
    where
        F: FnMut(&TimedSample),
    {
        while let Some(event) = events.recv().await {
            self.handle(event, &mut deliver);
        }
        self
    }
}
