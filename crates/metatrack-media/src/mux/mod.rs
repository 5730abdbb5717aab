//! Interleaving muxer.
//!
//! [`TrackMuxer::finalize`] takes the closed video stream and the drained
//! metadata samples of one recording and writes a single MP4 file where
//! each metadata sample sits in `mdat` ahead of the first video frame
//! presented at or after it.

mod boxes;
mod layout;
mod spool;

pub use spool::{SpooledFrame, VideoStream};

use crate::asset::{AssetFile, MuxedAsset};
use crate::{Error, Result};
use boxes::{TrackBoxes, TrackKind, METADATA_TRACK_ID, VIDEO_TRACK_ID};
use bytes::BytesMut;
use layout::TrackLayout;
use metatrack_common::{MediaTime, TimedSample};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Codec configuration box placed inside the video sample entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Box type, e.g. `avcC`.
    pub fourcc: [u8; 4],
    pub data: Vec<u8>,
}

/// Description of the video elementary stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFormat {
    /// Sample entry code, e.g. `avc1`.
    pub codec: [u8; 4],
    pub width: u32,
    pub height: u32,
    pub codec_config: Option<CodecConfig>,
}

impl VideoFormat {
    pub fn new(codec: [u8; 4], width: u32, height: u32) -> Self {
        Self {
            codec,
            width,
            height,
            codec_config: None,
        }
    }

    pub fn with_codec_config(mut self, fourcc: [u8; 4], data: impl Into<Vec<u8>>) -> Self {
        self.codec_config = Some(CodecConfig {
            fourcc,
            data: data.into(),
        });
        self
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self::new(*b"avc1", 1920, 1080)
    }
}

/// Muxer settings.
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Movie timescale, shared by both tracks.
    pub timescale: i32,
    /// Directory the finalized file is written into.
    pub output_dir: PathBuf,
    pub video: VideoFormat,
    /// MIME format declared by the metadata sample entry.
    pub metadata_mime: String,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            timescale: 600,
            output_dir: std::env::temp_dir(),
            video: VideoFormat::default(),
            metadata_mime: "application/json".to_string(),
        }
    }
}

/// Which track the previous `mdat` write belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    Video,
    Metadata,
}

/// Writes finalized recordings.
#[derive(Debug, Clone)]
pub struct TrackMuxer {
    config: MuxerConfig,
}

impl TrackMuxer {
    pub fn new(config: MuxerConfig) -> Result<Self> {
        if config.timescale <= 0 {
            return Err(Error::out_of_range(format!(
                "timescale must be positive, got {}",
                config.timescale
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    /// Interleave `video` and `metadata` into one asset.
    ///
    /// Both inputs must be sorted by presentation time. On any failure the
    /// partially written file is removed.
    /// Presentation times must land on a whole tick of the movie timescale.
    /// Frame durations are rounded to the nearest tick.
    pub fn finalize(
        &self,
        mut video: VideoStream,
        metadata: Vec<TimedSample>,
    ) -> Result<MuxedAsset> {
        let timescale = self.config.timescale;
        let frames = video.frames().to_vec();

        check_sorted("video", frames.iter().map(|f| f.presentation_time))?;
        check_sorted("metadata", metadata.iter().map(|s| s.presentation_time()))?;

        let video_pts = frames
            .iter()
            .map(|f| to_ticks(f.presentation_time, timescale))
            .collect::<Result<Vec<_>>>()?;
        let meta_pts = metadata
            .iter()
            .map(|s| to_ticks(s.presentation_time(), timescale))
            .collect::<Result<Vec<_>>>()?;

        let video_end = match (frames.last(), video_pts.last()) {
            (Some(frame), Some(pts)) => pts + duration_ticks(frame.duration, timescale)?,
            _ => 0,
        };
        let end = video_end.max(meta_pts.last().copied().unwrap_or(0));

        // Dropping the temp file on an early return deletes it.
        let mut tmp = NamedTempFile::new_in(&self.config.output_dir)?;
        let mut video_layout = TrackLayout::default();
        let mut meta_layout = TrackLayout::default();

        {
            let mut head = BytesMut::new();
            boxes::write_ftyp(&mut head);
            let mdat_start = head.len() as u64;

            let mut mdat = MdatWriter {
                out: BufWriter::new(tmp.as_file_mut()),
                pos: mdat_start + boxes::MDAT_HEADER_SIZE,
                previous: None,
            };
            mdat.out.write_all(&head)?;
            mdat.out.write_all(&boxes::mdat_header(0))?;

            let mut pending = metadata.iter().zip(meta_pts.iter().copied()).peekable();
            for (frame, pts) in frames.iter().zip(video_pts.iter().copied()) {
                while let Some((sample, at)) = pending.next_if(|(_, t)| *t <= pts) {
                    mdat.put_metadata(&mut meta_layout, sample, at)?;
                }
                video.copy_frame(frame, &mut mdat.out)?;
                mdat.record(Track::Video, &mut video_layout, frame.size, pts, frame.is_keyframe);
            }
            for (sample, at) in pending {
                mdat.put_metadata(&mut meta_layout, sample, at)?;
            }

            let MdatWriter { mut out, pos, .. } = mdat;
            let data_size = pos - mdat_start - boxes::MDAT_HEADER_SIZE;
            out.seek(SeekFrom::Start(mdat_start))?;
            out.write_all(&boxes::mdat_header(data_size))?;
            out.seek(SeekFrom::Start(pos))?;

            let tracks = [
                TrackBoxes {
                    track_id: VIDEO_TRACK_ID,
                    kind: TrackKind::Video(&self.config.video),
                    layout: &video_layout,
                    end: end as u64,
                },
                TrackBoxes {
                    track_id: METADATA_TRACK_ID,
                    kind: TrackKind::Metadata {
                        mime_format: &self.config.metadata_mime,
                    },
                    layout: &meta_layout,
                    end: end as u64,
                },
            ];
            let mut moov = BytesMut::new();
            boxes::write_moov(&mut moov, timescale as u32, end as u64, &tracks)?;
            out.write_all(&moov)?;
            out.flush()?;

            debug!(
                video_samples = video_layout.len(),
                metadata_samples = meta_layout.len(),
                mdat_bytes = data_size,
                "Wrote interleaved mdat"
            );
        }
        tmp.as_file().sync_all()?;

        let asset = MuxedAsset::load(AssetFile::Pending(tmp))?;
        info!(
            path = %asset.path().display(),
            duration = %asset.duration(),
            metadata_samples = asset.metadata_track().len(),
            "Finalized asset"
        );
        Ok(asset)
    }
}

/// Tracks the write position inside `mdat` and where chunks break.
struct MdatWriter<W> {
    out: W,
    pos: u64,
    previous: Option<Track>,
}

impl<W: Write> MdatWriter<W> {
    /// Note a sample of `size` bytes just written at the current position.
    fn record(
        &mut self,
        track: Track,
        layout: &mut TrackLayout,
        size: u32,
        pts: i64,
        is_sync: bool,
    ) {
        layout.push(self.pos, size, pts, is_sync, self.previous == Some(track));
        self.previous = Some(track);
        self.pos += size as u64;
    }

    fn put_metadata(
        &mut self,
        layout: &mut TrackLayout,
        sample: &TimedSample,
        pts: i64,
    ) -> Result<()> {
        let size = payload_size(sample)?;
        self.out.write_all(sample.payload())?;
        self.record(Track::Metadata, layout, size, pts, true);
        Ok(())
    }
}

fn check_sorted(track: &'static str, times: impl Iterator<Item = MediaTime>) -> Result<()> {
    let mut last: Option<MediaTime> = None;
    for (index, time) in times.enumerate() {
        if last.is_some_and(|prev| time < prev) {
            return Err(Error::UnsortedSamples { track, index });
        }
        last = Some(time);
    }
    Ok(())
}

/// Exact conversion of a presentation time into movie ticks.
fn to_ticks(time: MediaTime, timescale: i32) -> Result<i64> {
    let ticks = duration_ticks(time, timescale)?;
    if MediaTime::new(ticks, timescale) != time {
        return Err(Error::out_of_range(format!(
            "{} is not a whole tick at timescale {}",
            time, timescale
        )));
    }
    Ok(ticks)
}

fn duration_ticks(time: MediaTime, timescale: i32) -> Result<i64> {
    if time.is_negative() {
        return Err(Error::out_of_range(format!("negative time {}", time)));
    }
    Ok(time.rescale(timescale)?.value())
}

fn payload_size(sample: &TimedSample) -> Result<u32> {
    u32::try_from(sample.payload().len()).map_err(|_| {
        Error::out_of_range(format!("metadata payload of {} bytes", sample.payload().len()))
    })
}
