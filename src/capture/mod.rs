//! Capture session lifecycle.
//!
//! [`CaptureCoordinator`] moves through `Idle → Configuring → Recording →
//! Finishing → Idle`, with `Failed` reachable on unrecoverable errors.
//! While recording, video frames go to a worker task over a bounded
//! channel and metadata events are stamped into a
//! [`MetadataSampleBuffer`] that the worker drains.

mod buffer;
mod coordinator;
mod device;
mod worker;

pub use buffer::MetadataSampleBuffer;
pub use coordinator::{CaptureCoordinator, CapturePhase, VideoFrame};
pub use device::{CaptureDevice, SyntheticDevice};

use crate::config::{Backpressure, Config};
use crate::{Error, Result};
use metatrack_media::{MuxerConfig, VideoFormat};
use std::time::Duration;

/// Runtime settings for a coordinator, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub buffer_capacity: usize,
    pub backpressure: Backpressure,
    pub block_timeout: Duration,
    pub flush_interval: Duration,
    pub drain_timeout: Duration,
    pub finish_timeout: Duration,
    pub video_queue_depth: usize,
    /// Timescale, output directory and track descriptions.
    pub muxer: MuxerConfig,
}

impl CaptureSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let capture = &config.capture;
        let codec = config.video.fourcc().ok_or_else(|| {
            Error::Config(format!("invalid video codec '{}'", config.video.codec))
        })?;
        if capture.timescale <= 0 {
            return Err(Error::Config(format!("invalid timescale {}", capture.timescale)));
        }

        Ok(Self {
            buffer_capacity: capture.buffer_capacity,
            backpressure: capture.backpressure,
            block_timeout: capture.block_timeout(),
            flush_interval: capture.flush_interval(),
            drain_timeout: capture.drain_timeout(),
            finish_timeout: capture.finish_timeout(),
            video_queue_depth: capture.video_queue_depth,
            muxer: MuxerConfig {
                timescale: capture.timescale,
                output_dir: capture.output_dir.clone(),
                video: VideoFormat::new(codec, config.video.width, config.video.height),
                metadata_mime: config.metadata.mime_format.clone(),
            },
        })
    }

    pub fn timescale(&self) -> i32 {
        self.muxer.timescale
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let config = Config::default();
        let capture = &config.capture;
        Self {
            buffer_capacity: capture.buffer_capacity,
            backpressure: capture.backpressure,
            block_timeout: capture.block_timeout(),
            flush_interval: capture.flush_interval(),
            drain_timeout: capture.drain_timeout(),
            finish_timeout: capture.finish_timeout(),
            video_queue_depth: capture.video_queue_depth,
            muxer: MuxerConfig {
                timescale: capture.timescale,
                output_dir: capture.output_dir.clone(),
                ..MuxerConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.video.codec = "hvc1".to_string();
        config.capture.timescale = 90_000;

        let settings = CaptureSettings::from_config(&config).unwrap();
        assert_eq!(settings.muxer.video.codec, *b"hvc1");
        assert_eq!(settings.timescale(), 90_000);
        assert_eq!(settings.drain_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_settings_reject_bad_codec() {
        let mut config = Config::default();
        config.video.codec = "h264-high".to_string();
        assert!(matches!(
            CaptureSettings::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
