//! ISO-BMFF box serialization for finalized assets.

use super::layout::TrackLayout;
use super::VideoFormat;
use crate::Result;
use bytes::{BufMut, BytesMut};

/// Size of the `mdat` header written with a 64-bit length.
pub(crate) const MDAT_HEADER_SIZE: u64 = 16;

pub(crate) const VIDEO_TRACK_ID: u32 = 1;
pub(crate) const METADATA_TRACK_ID: u32 = 2;

/// What a trak describes beyond its sample layout.
pub(crate) enum TrackKind<'a> {
    Video(&'a VideoFormat),
    Metadata { mime_format: &'a str },
}

/// One track ready for serialization.
pub(crate) struct TrackBoxes<'a> {
    pub track_id: u32,
    pub kind: TrackKind<'a>,
    pub layout: &'a TrackLayout,
    /// Presentation end of the track in container ticks.
    pub end: u64,
}

/// Open a box; returns the position of its size field.
fn begin(buf: &mut BytesMut, kind: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(kind);
    start
}

/// Patch the size of a box opened with [`begin`].
fn finish(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Open a full box (version + flags).
fn begin_full(buf: &mut BytesMut, kind: &[u8; 4], version: u8, flags: u32) -> usize {
    let start = begin(buf, kind);
    buf.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
    start
}

fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        buf.put_u32(value);
    }
}

pub(crate) fn write_ftyp(buf: &mut BytesMut) {
    let start = begin(buf, b"ftyp");
    buf.put_slice(b"isom"); // major brand
    buf.put_u32(0x200); // minor version
    for brand in [b"isom", b"iso2", b"mp41"] {
        buf.put_slice(brand);
    }
    finish(buf, start);
}

/// 64-bit `mdat` header for a payload of `data_size` bytes.
pub(crate) fn mdat_header(data_size: u64) -> [u8; MDAT_HEADER_SIZE as usize] {
    let mut header = [0u8; MDAT_HEADER_SIZE as usize];
    header[0..4].copy_from_slice(&1u32.to_be_bytes());
    header[4..8].copy_from_slice(b"mdat");
    header[8..16].copy_from_slice(&(data_size + MDAT_HEADER_SIZE).to_be_bytes());
    header
}

pub(crate) fn write_moov(
    buf: &mut BytesMut,
    timescale: u32,
    duration: u64,
    tracks: &[TrackBoxes<'_>],
) -> Result<()> {
    let start = begin(buf, b"moov");
    write_mvhd(buf, timescale, duration, tracks.len() as u32 + 1);
    for track in tracks {
        write_trak(buf, timescale, track)?;
    }
    finish(buf, start);
    Ok(())
}

fn write_mvhd(buf: &mut BytesMut, timescale: u32, duration: u64, next_track_id: u32) {
    let start = begin_full(buf, b"mvhd", 1, 0);
    buf.put_u64(0); // creation time
    buf.put_u64(0); // modification time
    buf.put_u32(timescale);
    buf.put_u64(duration);
    buf.put_u32(0x00010000); // rate = 1.0
    buf.put_u16(0x0100); // volume = 1.0
    buf.put_u16(0);
    buf.put_u64(0);
    put_identity_matrix(buf);
    buf.put_bytes(0, 24); // pre_defined
    buf.put_u32(next_track_id);
    finish(buf, start);
}

fn write_trak(buf: &mut BytesMut, timescale: u32, track: &TrackBoxes<'_>) -> Result<()> {
    let start = begin(buf, b"trak");
    write_tkhd(buf, track);

    let mdia = begin(buf, b"mdia");
    write_mdhd(buf, timescale, track.end);
    match track.kind {
        TrackKind::Video(_) => write_hdlr(buf, b"vide", b"VideoHandler"),
        TrackKind::Metadata { .. } => write_hdlr(buf, b"meta", b"TimedMetadataHandler"),
    }

    let minf = begin(buf, b"minf");
    match track.kind {
        TrackKind::Video(_) => {
            let vmhd = begin_full(buf, b"vmhd", 0, 1);
            buf.put_u16(0); // graphics mode
            buf.put_bytes(0, 6); // opcolor
            finish(buf, vmhd);
        }
        TrackKind::Metadata { .. } => {
            let nmhd = begin_full(buf, b"nmhd", 0, 0);
            finish(buf, nmhd);
        }
    }
    write_dinf(buf);
    write_stbl(buf, track)?;
    finish(buf, minf);

    finish(buf, mdia);
    finish(buf, start);
    Ok(())
}

fn write_tkhd(buf: &mut BytesMut, track: &TrackBoxes<'_>) {
    // Flags: enabled, in_movie, in_preview.
    let start = begin_full(buf, b"tkhd", 1, 7);
    buf.put_u64(0); // creation time
    buf.put_u64(0); // modification time
    buf.put_u32(track.track_id);
    buf.put_u32(0);
    buf.put_u64(track.end);
    buf.put_u64(0);
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate group
    buf.put_u16(0); // volume
    buf.put_u16(0);
    put_identity_matrix(buf);
    let (width, height) = match track.kind {
        TrackKind::Video(format) => (format.width, format.height),
        TrackKind::Metadata { .. } => (0, 0),
    };
    buf.put_u32(width << 16);
    buf.put_u32(height << 16);
    finish(buf, start);
}

fn write_mdhd(buf: &mut BytesMut, timescale: u32, duration: u64) {
    let start = begin_full(buf, b"mdhd", 1, 0);
    buf.put_u64(0);
    buf.put_u64(0);
    buf.put_u32(timescale);
    buf.put_u64(duration);
    buf.put_u16(0x55C4); // language: und
    buf.put_u16(0);
    finish(buf, start);
}

fn write_hdlr(buf: &mut BytesMut, handler: &[u8; 4], name: &[u8]) {
    let start = begin_full(buf, b"hdlr", 0, 0);
    buf.put_u32(0); // pre_defined
    buf.put_slice(handler);
    buf.put_bytes(0, 12);
    buf.put_slice(name);
    buf.put_u8(0);
    finish(buf, start);
}

fn write_dinf(buf: &mut BytesMut) {
    let dinf = begin(buf, b"dinf");
    let dref = begin_full(buf, b"dref", 0, 0);
    buf.put_u32(1); // entry count
    let url = begin_full(buf, b"url ", 0, 1); // self-contained
    finish(buf, url);
    finish(buf, dref);
    finish(buf, dinf);
}

fn write_stbl(buf: &mut BytesMut, track: &TrackBoxes<'_>) -> Result<()> {
    let layout = track.layout;
    let start = begin(buf, b"stbl");

    let stsd = begin_full(buf, b"stsd", 0, 0);
    buf.put_u32(1);
    match track.kind {
        TrackKind::Video(format) => write_visual_entry(buf, format),
        TrackKind::Metadata { mime_format } => write_mett_entry(buf, mime_format),
    }
    finish(buf, stsd);

    let stts = begin_full(buf, b"stts", 0, 0);
    let deltas = layout.decode_deltas(track.end as i64)?;
    buf.put_u32(deltas.len() as u32);
    for (count, delta) in deltas {
        buf.put_u32(count);
        buf.put_u32(delta);
    }
    finish(buf, stts);

    let offset = layout.composition_offset()?;
    if offset != 0 {
        let ctts = begin_full(buf, b"ctts", 0, 0);
        buf.put_u32(1);
        buf.put_u32(layout.len() as u32);
        buf.put_u32(offset as u32);
        finish(buf, ctts);
    }

    if let Some(sync) = layout.sync_samples() {
        let stss = begin_full(buf, b"stss", 0, 0);
        buf.put_u32(sync.len() as u32);
        for number in sync {
            buf.put_u32(*number);
        }
        finish(buf, stss);
    }

    let stsc = begin_full(buf, b"stsc", 0, 0);
    let runs = layout.stsc_entries();
    buf.put_u32(runs.len() as u32);
    for (first_chunk, per_chunk, description) in runs {
        buf.put_u32(first_chunk);
        buf.put_u32(per_chunk);
        buf.put_u32(description);
    }
    finish(buf, stsc);

    let stsz = begin_full(buf, b"stsz", 0, 0);
    buf.put_u32(0); // sizes listed per sample
    buf.put_u32(layout.len() as u32);
    for size in layout.sizes() {
        buf.put_u32(*size);
    }
    finish(buf, stsz);

    let offsets = layout.chunk_offsets();
    if offsets.iter().any(|&o| o > u32::MAX as u64) {
        let co64 = begin_full(buf, b"co64", 0, 0);
        buf.put_u32(offsets.len() as u32);
        for o in offsets {
            buf.put_u64(o);
        }
        finish(buf, co64);
    } else {
        let stco = begin_full(buf, b"stco", 0, 0);
        buf.put_u32(offsets.len() as u32);
        for o in offsets {
            buf.put_u32(o as u32);
        }
        finish(buf, stco);
    }

    finish(buf, start);
    Ok(())
}

fn write_visual_entry(buf: &mut BytesMut, format: &VideoFormat) {
    let start = begin(buf, &format.codec);
    buf.put_bytes(0, 6); // reserved
    buf.put_u16(1); // data reference index
    buf.put_u16(0);
    buf.put_u16(0);
    buf.put_bytes(0, 12);
    buf.put_u16(format.width as u16);
    buf.put_u16(format.height as u16);
    buf.put_u32(0x00480000); // 72 dpi
    buf.put_u32(0x00480000);
    buf.put_u32(0);
    buf.put_u16(1); // frame count
    buf.put_bytes(0, 32); // compressor name
    buf.put_u16(0x0018); // depth
    buf.put_i16(-1);
    if let Some(config) = &format.codec_config {
        let child = begin(buf, &config.fourcc);
        buf.put_slice(&config.data);
        finish(buf, child);
    }
    finish(buf, start);
}

fn write_mett_entry(buf: &mut BytesMut, mime_format: &str) {
    let start = begin(buf, b"mett");
    buf.put_bytes(0, 6);
    buf.put_u16(1); // data reference index
    buf.put_u8(0); // content_encoding: empty
    buf.put_slice(mime_format.as_bytes());
    buf.put_u8(0);
    finish(buf, start);
}
