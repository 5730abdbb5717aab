//! Shared test harness for integration tests.
//!
//! Provides [`CaptureHarness`], which wires a [`CaptureCoordinator`] to a
//! synthetic device, a manually driven clock and an in-memory asset store,
//! all writing into a scratch directory.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metatrack::capture::{CaptureCoordinator, CaptureSettings, SyntheticDevice, VideoFrame};
use metatrack::store::MemoryAssetStore;
use metatrack_common::{Clock, ManualClock, MediaTime, TimedSample};
use metatrack_media::{MuxedAsset, MuxerConfig, TrackMuxer, VideoStream};
use tempfile::TempDir;

/// One frame at 30 fps in a 600 timescale.
pub const FRAME: MediaTime = MediaTime::new(20, 600);

pub fn ms(millis: i64) -> MediaTime {
    MediaTime::from_millis(millis)
}

pub fn sample(payload: &str, millis: i64) -> TimedSample {
    TimedSample::new(Bytes::copy_from_slice(payload.as_bytes()), ms(millis))
}

/// Coordinator plus the collaborators a test needs to drive it.
pub struct CaptureHarness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub device: Arc<SyntheticDevice>,
    pub store: Arc<MemoryAssetStore>,
    pub coordinator: CaptureCoordinator,
    next_frame: u64,
}

impl CaptureHarness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Build a harness after letting `configure` adjust the settings.
    pub fn with_settings(configure: impl FnOnce(&mut CaptureSettings)) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut settings = CaptureSettings::default();
        settings.muxer.output_dir = dir.path().join("recordings");
        // Tests drain explicitly through stop unless they shorten this.
        settings.flush_interval = Duration::from_secs(3600);
        configure(&mut settings);

        let clock = Arc::new(ManualClock::new());
        let device = Arc::new(SyntheticDevice::new("test-camera").with_keyframe_interval(10));
        let store = Arc::new(MemoryAssetStore::new());
        let coordinator = CaptureCoordinator::new(settings, device.clone(), store.clone())
            .with_clock(clock.clone());

        Self {
            dir,
            clock,
            device,
            store,
            coordinator,
            next_frame: 0,
        }
    }

    /// Push the next synthetic frame at the current clock time, then
    /// advance the clock by one frame.
    pub fn push_frame(&mut self) -> metatrack::Result<MediaTime> {
        let index = self.next_frame;
        let frame = VideoFrame {
            data: self.device.frame_payload(index),
            capture_time: self.clock.now(),
            duration: FRAME,
            is_keyframe: self.device.is_keyframe(index),
        };
        let result = self.coordinator.push_video_frame(frame);
        self.next_frame += 1;
        self.clock.advance(FRAME);
        result
    }

    pub fn push_frames(&mut self, count: usize) {
        for _ in 0..count {
            self.push_frame().expect("frame rejected");
        }
    }

    /// Files currently present in the recording output directory.
    pub fn output_files(&self) -> Vec<std::path::PathBuf> {
        match std::fs::read_dir(self.dir.path().join("recordings")) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Finalize `frames` frames of synthetic video with `metadata` into `dir`.
pub fn finalize_asset(dir: &TempDir, frames: i64, metadata: Vec<TimedSample>) -> MuxedAsset {
    let muxer = TrackMuxer::new(MuxerConfig {
        output_dir: dir.path().to_path_buf(),
        ..MuxerConfig::default()
    })
    .expect("muxer config");

    let mut video = VideoStream::empty().expect("spool");
    for i in 0..frames {
        let payload = vec![(i % 256) as u8; 64];
        video
            .append(&payload, MediaTime::new(i * 20, 600), FRAME, i % 10 == 0)
            .expect("append frame");
    }
    muxer.finalize(video, metadata).expect("finalize")
}
