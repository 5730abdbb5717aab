//! Capture hardware abstraction.

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// A source of video frames the coordinator can record from.
pub trait CaptureDevice: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the device can be opened right now.
    fn is_available(&self) -> bool;
}

/// Stand-in device producing placeholder frame payloads.
#[derive(Debug)]
pub struct SyntheticDevice {
    name: String,
    available: AtomicBool,
    keyframe_interval: u64,
}

impl SyntheticDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: AtomicBool::new(true),
            keyframe_interval: 30,
        }
    }

    pub fn with_keyframe_interval(mut self, interval: u64) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_keyframe(&self, index: u64) -> bool {
        index % self.keyframe_interval == 0
    }

    /// Payload for frame `index`: a length-prefixed fake NAL unit.
    pub fn frame_payload(&self, index: u64) -> Bytes {
        let nal_type: u8 = if self.is_keyframe(index) { 0x65 } else { 0x41 };
        let body_len = if self.is_keyframe(index) { 64 } else { 16 };

        let mut buf = BytesMut::with_capacity(4 + 1 + 8 + body_len);
        buf.put_u32((1 + 8 + body_len) as u32);
        buf.put_u8(nal_type);
        buf.put_u64(index);
        buf.put_bytes((index % 251) as u8, body_len);
        buf.freeze()
    }
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self::new("synthetic")
    }
}

impl CaptureDevice for SyntheticDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
