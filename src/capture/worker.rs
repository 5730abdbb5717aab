//! Recording worker.
//!
//! Runs off the capture context: spools forwarded video frames to disk,
//! drains the metadata buffer on a fixed interval, and on channel close
//! performs the final drain and hands everything to the muxer.

use super::MetadataSampleBuffer;
use crate::{Error, Result};
use bytes::Bytes;
use metatrack_common::{MediaTime, SessionId, TimedSample};
use metatrack_media::{MuxedAsset, SpooledFrame, TrackMuxer, VideoStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// A video frame already mapped onto the presentation timeline.
#[derive(Debug)]
pub(crate) struct StampedFrame {
    pub data: Bytes,
    pub presentation_time: MediaTime,
    pub duration: MediaTime,
    pub is_keyframe: bool,
}

pub(crate) struct RecordingWorker {
    pub session_id: SessionId,
    pub frames: mpsc::Receiver<StampedFrame>,
    pub buffer: Arc<MetadataSampleBuffer>,
    pub muxer: TrackMuxer,
    pub flush_interval: Duration,
    pub drain_timeout: Duration,
    /// Receives the cause if the worker gives up.
    pub failure: Option<oneshot::Sender<String>>,
}

impl RecordingWorker {
    /// Record until the frame channel closes, then finalize.
    ///
    /// On error the cause is reported and the buffer closed before the
    /// frame receiver is dropped.
    pub async fn run(mut self, spool: std::fs::File) -> Result<MuxedAsset> {
        let result = self.record(spool).await;
        if let Err(e) = &result {
            error!(session_id = %self.session_id, error = %e, "Recording worker failed");
            if let Some(failure) = self.failure.take() {
                let _ = failure.send(e.to_string());
            }
            self.buffer.close();
        }
        result
    }

    async fn record(&mut self, spool: std::fs::File) -> Result<MuxedAsset> {
        let session_id = self.session_id;
        let mut spool = BufWriter::new(tokio::fs::File::from_std(spool));
        let mut index: Vec<SpooledFrame> = Vec::new();
        let mut offset = 0u64;
        let mut collected: Vec<TimedSample> = Vec::new();

        let start = tokio::time::Instant::now() + self.flush_interval;
        let mut flush = tokio::time::interval_at(start, self.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = self.frames.recv() => {
                    let Some(frame) = frame else { break };
                    let size = u32::try_from(frame.data.len()).map_err(|_| {
                        metatrack_media::Error::out_of_range(format!(
                            "video frame of {} bytes",
                            frame.data.len()
                        ))
                    })?;
                    spool.write_all(&frame.data).await?;
                    index.push(SpooledFrame {
                        offset,
                        size,
                        presentation_time: frame.presentation_time,
                        duration: frame.duration,
                        is_keyframe: frame.is_keyframe,
                    });
                    offset += size as u64;
                }
                _ = flush.tick() => {
                    spool.flush().await?;
                    let drained = self.buffer.drain();
                    if !drained.is_empty() {
                        debug!(
                            session_id = %session_id,
                            samples = drained.len(),
                            "Flushed metadata"
                        );
                        collected.extend(drained);
                    }
                }
            }
        }

        // The buffer is closed by now; whatever is left is the tail.
        let drain_timeout = self.drain_timeout;
        let tail = {
            let buffer = self.buffer.clone();
            tokio::task::spawn_blocking(move || buffer.drain_timeout(drain_timeout))
                .await
                .map_err(|e| Error::failed(format!("final drain task failed: {}", e)))?
        }
        .ok_or_else(|| {
            Error::failed(format!(
                "timed out after {:?} waiting for the metadata buffer",
                drain_timeout
            ))
        })?;
        debug!(session_id = %session_id, samples = tail.len(), "Final metadata drain");
        collected.extend(tail);

        spool.flush().await?;
        let spool = spool.into_inner().into_std().await;
        let video = VideoStream::new(spool, index);
        debug!(
            session_id = %session_id,
            video_frames = video.len(),
            metadata_samples = collected.len(),
            "Finalizing recording"
        );

        let muxer = self.muxer.clone();
        tokio::task::spawn_blocking(move || muxer.finalize(video, collected))
            .await
            .map_err(|e| Error::failed(format!("finalize task failed: {}", e)))?
            .map_err(Error::from)
    }
}
