use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub video: VideoConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// What a producer experiences when the metadata buffer is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backpressure {
    /// Return `BufferFull` immediately.
    #[default]
    FailFast,
    /// Wait up to `block_timeout_ms` for a drain, then return `BufferFull`.
    Block,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Ticks per second for presentation times and the container.
    #[serde(default = "default_timescale")]
    pub timescale: i32,

    /// Maximum queued metadata samples between flushes.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default)]
    pub backpressure: Backpressure,

    #[serde(default = "default_block_timeout")]
    pub block_timeout_ms: u64,

    /// How often the worker drains the metadata buffer while recording.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,

    /// Upper bound on acquiring the buffer for the final drain.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,

    /// Upper bound on stop-recording, finalize included.
    #[serde(default = "default_finish_timeout")]
    pub finish_timeout_ms: u64,

    #[serde(default = "default_video_queue_depth")]
    pub video_queue_depth: usize,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_timescale() -> i32 {
    600
}
fn default_buffer_capacity() -> usize {
    256
}
fn default_block_timeout() -> u64 {
    50
}
fn default_flush_interval() -> u64 {
    100
}
fn default_drain_timeout() -> u64 {
    500
}
fn default_finish_timeout() -> u64 {
    10_000
}
fn default_video_queue_depth() -> usize {
    64
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./recordings")
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timescale: default_timescale(),
            buffer_capacity: default_buffer_capacity(),
            backpressure: Backpressure::default(),
            block_timeout_ms: default_block_timeout(),
            flush_interval_ms: default_flush_interval(),
            drain_timeout_ms: default_drain_timeout(),
            finish_timeout_ms: default_finish_timeout(),
            video_queue_depth: default_video_queue_depth(),
            output_dir: default_output_dir(),
        }
    }
}

impl CaptureConfig {
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn finish_timeout(&self) -> Duration {
        Duration::from_millis(self.finish_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoConfig {
    /// Sample entry fourcc, e.g. `avc1` or `hvc1`.
    #[serde(default = "default_codec")]
    pub codec: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

fn default_codec() -> String {
    "avc1".to_string()
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_frame_rate() -> u32 {
    30
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            width: default_width(),
            height: default_height(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl VideoConfig {
    /// The codec as a sample entry code, if it is exactly four ASCII bytes.
    pub fn fourcc(&self) -> Option<[u8; 4]> {
        let bytes: [u8; 4] = self.codec.as_bytes().try_into().ok()?;
        bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ').then_some(bytes)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    /// MIME format declared by the metadata track.
    #[serde(default = "default_mime_format")]
    pub mime_format: String,
}

fn default_mime_format() -> String {
    "application/json".to_string()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            mime_format: default_mime_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory persisted assets are kept in.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./assets")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}
