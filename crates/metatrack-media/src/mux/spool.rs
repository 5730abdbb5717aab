//! Spooled video elementary stream.
//!
//! Frames forwarded during recording are appended to a scratch file; only
//! their placement is kept in memory. The muxer copies payloads out of the
//! spool into the interleaved `mdat` at finalize time.

use crate::Result;
use metatrack_common::MediaTime;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Placement and timing of one spooled video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpooledFrame {
    /// Byte offset of the payload within the spool file.
    pub offset: u64,
    pub size: u32,
    pub presentation_time: MediaTime,
    pub duration: MediaTime,
    pub is_keyframe: bool,
}

/// A closed video stream: spool file plus frame index.
#[derive(Debug)]
pub struct VideoStream {
    file: File,
    frames: Vec<SpooledFrame>,
    end: u64,
}

impl VideoStream {
    /// Wrap an already written spool file.
    pub fn new(file: File, frames: Vec<SpooledFrame>) -> Self {
        let end = frames
            .iter()
            .map(|f| f.offset + f.size as u64)
            .max()
            .unwrap_or(0);
        Self { file, frames, end }
    }

    /// A stream with no frames, spooled to an anonymous temp file.
    pub fn empty() -> Result<Self> {
        Ok(Self::new(tempfile::tempfile()?, Vec::new()))
    }

    /// Append a frame payload to the end of the spool.
    pub fn append(
        &mut self,
        data: &[u8],
        presentation_time: MediaTime,
        duration: MediaTime,
        is_keyframe: bool,
    ) -> Result<()> {
        let size = u32::try_from(data.len())
            .map_err(|_| crate::Error::out_of_range(format!("frame of {} bytes", data.len())))?;
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(data)?;
        self.frames.push(SpooledFrame {
            offset: self.end,
            size,
            presentation_time,
            duration,
            is_keyframe,
        });
        self.end += size as u64;
        Ok(())
    }

    pub fn frames(&self) -> &[SpooledFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Copy one frame's payload into `out`.
    pub(crate) fn copy_frame<W: Write>(&mut self, frame: &SpooledFrame, out: &mut W) -> Result<()> {
        self.file.seek(SeekFrom::Start(frame.offset))?;
        let copied = io::copy(&mut (&mut self.file).take(frame.size as u64), out)?;
        if copied != frame.size as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "spool truncated: frame at {} wanted {} bytes, got {}",
                    frame.offset, frame.size, copied
                ),
            )
            .into());
        }
        Ok(())
    }
}
