//! Metadata delivery during playback.
//!
//! A [`PlaybackSynchronizer`] is the cursor over one asset's metadata
//! track. Every time-advance recomputes the delivery boundary from the
//! absolute time, so arbitrary jumps need no special handling:
//!
//! - advancing to `t` delivers each undelivered sample with time `<= t`
//! - seeking to `t` moves the boundary without delivering anything, so a
//!   forward seek skips samples and a backward seek lets them play again

mod session;

pub use session::{PlaybackSession, PlayerEvent};

use metatrack_common::{MediaTime, TimedSample};
use metatrack_media::MuxedAsset;
use std::sync::Arc;
use tracing::trace;

/// A time-ordered metadata track the synchronizer can walk.
pub trait MetadataTrack: Send + Sync {
    fn samples(&self) -> &[TimedSample];
}

impl MetadataTrack for MuxedAsset {
    fn samples(&self) -> &[TimedSample] {
        self.metadata_track()
    }
}

impl MetadataTrack for Vec<TimedSample> {
    fn samples(&self) -> &[TimedSample] {
        self
    }
}

/// Playback cursor over a shared, read-only metadata track.
#[derive(Debug)]
pub struct PlaybackSynchronizer<T: ?Sized = MuxedAsset> {
    track: Arc<T>,
    current_time: MediaTime,
    /// Smallest index not yet delivered at `current_time`.
    next_index: usize,
}

impl<T: MetadataTrack + ?Sized> PlaybackSynchronizer<T> {
    /// A cursor positioned before time zero.
    pub fn new(track: Arc<T>) -> Self {
        Self {
            track,
            current_time: MediaTime::ZERO,
            next_index: 0,
        }
    }

    pub fn track(&self) -> &Arc<T> {
        &self.track
    }

    pub fn current_time(&self) -> MediaTime {
        self.current_time
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Whether every sample has been delivered.
    pub fn is_exhausted(&self) -> bool {
        self.next_index >= self.track.samples().len()
    }

    /// Move playback to `time`, handing every sample that became due to
    /// `deliver` in ascending order. Returns how many were delivered.
    ///
    /// Moving backwards delivers nothing and rewinds the cursor.
    pub fn advance_to<F>(&mut self, time: MediaTime, mut deliver: F) -> usize
    where
        F: FnMut(&TimedSample),
    {
        let samples = self.track.samples();
        let target = boundary(samples, time);
        let start = self.next_index.min(target);

        for sample in &samples[start..target] {
            trace!(time = %sample.presentation_time(), "Delivering metadata sample");
            deliver(sample);
        }

        self.next_index = target;
        self.current_time = time;
        target - start
    }

    /// Jump to `time` without delivering anything.
    pub fn seek(&mut self, time: MediaTime) {
        self.next_index = boundary(self.track.samples(), time);
        self.current_time = time;
    }
}

impl<T: ?Sized> Clone for PlaybackSynchronizer<T> {
    fn clone(&self) -> Self {
        Self {
            track: Arc::clone(&self.track),
            current_time: self.current_time,
            next_index: self.next_index,
        }
    }
}

/// Index of the first sample presented after `time`.
fn boundary(samples: &[TimedSample], time: MediaTime) -> usize {
    samples.partition_point(|s| s.presentation_time() <= time)
}
