//! The finalized recording.

use crate::mp4::{Mp4File, TrackInfo};
use crate::{Error, Result};
use metatrack_common::{MediaTime, TimedSample};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Backing file of a [`MuxedAsset`].
#[derive(Debug)]
pub enum AssetFile {
    /// Freshly finalized, not yet persisted. Deleted on drop.
    Pending(NamedTempFile),
    /// Persisted at a durable location.
    Stored(PathBuf),
}

impl AssetFile {
    pub fn path(&self) -> &Path {
        match self {
            Self::Pending(tmp) => tmp.path(),
            Self::Stored(path) => path,
        }
    }

    fn open(&self) -> Result<File> {
        Ok(match self {
            Self::Pending(tmp) => tmp.reopen()?,
            Self::Stored(path) => File::open(path)?,
        })
    }
}

/// A read-only recording: video track description plus the full,
/// time-ordered metadata track.
#[derive(Debug)]
pub struct MuxedAsset {
    timescale: i32,
    duration: MediaTime,
    video_track: TrackInfo,
    metadata_track: Vec<TimedSample>,
    metadata_mime: Option<String>,
    source: AssetFile,
}

impl MuxedAsset {
    /// Read an asset file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(AssetFile::Stored(path.as_ref().to_path_buf()))
    }

    pub(crate) fn load(source: AssetFile) -> Result<Self> {
        let mut reader = BufReader::new(source.open()?);
        let mp4 = Mp4File::parse(&mut reader)?;

        let timescale = i32::try_from(mp4.timescale)
            .ok()
            .filter(|ts| *ts > 0)
            .ok_or_else(|| Error::invalid_mp4(format!("movie timescale {}", mp4.timescale)))?;
        let duration = MediaTime::new(
            i64::try_from(mp4.duration)
                .map_err(|_| Error::out_of_range(format!("duration {}", mp4.duration)))?,
            timescale,
        );

        let video_track = mp4
            .video_track
            .ok_or_else(|| Error::invalid_mp4("no video track"))?;
        let meta = mp4
            .metadata_track
            .ok_or_else(|| Error::invalid_mp4("no timed metadata track"))?;
        let metadata_track = read_metadata(&mut reader, &meta)?;

        Ok(Self {
            timescale,
            duration,
            video_track,
            metadata_track,
            metadata_mime: meta.mime_format,
            source,
        })
    }

    /// Movie timescale shared by both tracks.
    pub fn timescale(&self) -> i32 {
        self.timescale
    }

    pub fn duration(&self) -> MediaTime {
        self.duration
    }

    pub fn video_track(&self) -> &TrackInfo {
        &self.video_track
    }

    /// Metadata samples sorted by presentation time, ties in write order.
    pub fn metadata_track(&self) -> &[TimedSample] {
        &self.metadata_track
    }

    pub fn metadata_mime(&self) -> Option<&str> {
        self.metadata_mime.as_deref()
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    /// Whether the file still lives in its temporary location.
    pub fn is_pending(&self) -> bool {
        matches!(self.source, AssetFile::Pending(_))
    }

    /// Move the file to `dest`.
    ///
    /// Pending files are renamed into place, so `dest` either holds the
    /// complete asset or is untouched. Already stored files are copied.
    pub fn persist<P: AsRef<Path>>(&mut self, dest: P) -> Result<()> {
        let dest = dest.as_ref().to_path_buf();
        match std::mem::replace(&mut self.source, AssetFile::Stored(dest.clone())) {
            AssetFile::Pending(tmp) => {
                if let Err(e) = tmp.persist(&dest) {
                    self.source = AssetFile::Pending(e.file);
                    return Err(e.error.into());
                }
            }
            AssetFile::Stored(current) => {
                if current != dest {
                    if let Err(e) = std::fs::copy(&current, &dest) {
                        self.source = AssetFile::Stored(current);
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }
}

fn read_metadata<R: Read + Seek>(reader: &mut R, track: &TrackInfo) -> Result<Vec<TimedSample>> {
    let timescale = i32::try_from(track.timescale)
        .ok()
        .filter(|ts| *ts > 0)
        .ok_or_else(|| Error::invalid_mp4(format!("metadata timescale {}", track.timescale)))?;

    track
        .sample_table
        .iter()
        .map(|entry| {
            reader.seek(SeekFrom::Start(entry.offset))?;
            let mut payload = vec![0u8; entry.size as usize];
            reader.read_exact(&mut payload)?;
            let pts = i64::try_from(entry.pts())
                .map_err(|_| Error::out_of_range(format!("sample time {}", entry.pts())))?;
            Ok(TimedSample::new(payload, MediaTime::new(pts, timescale)))
        })
        .collect()
}
