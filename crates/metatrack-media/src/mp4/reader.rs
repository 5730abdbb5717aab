//! MP4 file reader with atom parsing.

use super::{Atom, AtomType, HandlerType, Mp4File, SampleTableBuilder, TrackInfo};
use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom};

/// Maximum allowed atom data size (64 MB) to prevent OOM on malformed files.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn be_u64(data: &[u8], at: usize) -> Option<u64> {
    data.get(at..at + 8).map(|b| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(b);
        u64::from_be_bytes(bytes)
    })
}

fn fourcc(data: &[u8], at: usize) -> Option<[u8; 4]> {
    data.get(at..at + 4).map(|b| [b[0], b[1], b[2], b[3]])
}

/// Read a full-box entry table: `entry_count` at offset 4, entries of
/// `stride` bytes from offset 8. Truncated tables yield the complete
/// entries only.
fn table_entries<T>(data: &[u8], stride: usize, parse: impl Fn(usize) -> Option<T>) -> Vec<T> {
    let count = be_u32(data, 4).unwrap_or(0) as usize;
    (0..count)
        .map_while(|i| parse(8 + i * stride))
        .collect()
}

/// Read a NUL-terminated string starting at `at`; returns it and the
/// offset just past the terminator.
fn c_string(data: &[u8], at: usize) -> Option<(String, usize)> {
    let rest = data.get(at..)?;
    let len = rest.iter().position(|&b| b == 0)?;
    let text = String::from_utf8_lossy(&rest[..len]).into_owned();
    Some((text, at + len + 1))
}

/// MP4 file reader.
pub struct Mp4Reader<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> Mp4Reader<R> {
    pub fn new(mut reader: R) -> Self {
        let file_size = reader.seek(SeekFrom::End(0)).unwrap_or(0);
        let _ = reader.seek(SeekFrom::Start(0));
        Self { reader, file_size }
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Parse the container structure.
    pub fn parse(&mut self) -> Result<Mp4File> {
        let mut mp4 = Mp4File {
            duration: 0,
            timescale: 1000,
            video_track: None,
            metadata_track: None,
            has_faststart: false,
        };

        let atoms = self.read_atoms(0, self.file_size)?;
        let moov = atoms
            .iter()
            .find(|a| a.atom_type == AtomType::MOOV)
            .ok_or(Error::MissingAtom("moov"))?;
        self.parse_moov(moov, &mut mp4)?;

        let moov_start = moov.data_offset - moov.header_size as u64;
        mp4.has_faststart = atoms
            .iter()
            .find(|a| a.atom_type == AtomType::MDAT)
            .map_or(true, |mdat| moov_start < mdat.data_offset);

        Ok(mp4)
    }

    /// Read sibling atom headers in `[start, end)`.
    fn read_atoms(&mut self, start: u64, end: u64) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = start;

        while pos < end {
            self.reader.seek(SeekFrom::Start(pos))?;

            let mut header = [0u8; 8];
            if self.reader.read_exact(&mut header).is_err() {
                break;
            }

            let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let atom_type = AtomType([header[4], header[5], header[6], header[7]]);

            let (actual_size, header_size) = match size {
                1 => {
                    let mut ext = [0u8; 8];
                    self.reader.read_exact(&mut ext)?;
                    (u64::from_be_bytes(ext), 16u8)
                }
                0 => (end - pos, 8u8),
                _ => (size, 8u8),
            };

            if actual_size < header_size as u64 {
                break;
            }

            atoms.push(Atom {
                atom_type,
                size: actual_size,
                data_offset: pos + header_size as u64,
                header_size,
            });

            pos += actual_size;
        }

        Ok(atoms)
    }

    fn read_children(&mut self, parent: &Atom) -> Result<Vec<Atom>> {
        self.read_atoms(parent.data_offset, parent.end())
    }

    /// Read atom data, rejecting oversized atoms.
    fn read_atom_data(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(Error::invalid_mp4(format!(
                "Atom {} data size {} exceeds maximum {}",
                atom.atom_type, size, MAX_ATOM_DATA_SIZE
            )));
        }
        self.reader.seek(SeekFrom::Start(atom.data_offset))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    fn parse_moov(&mut self, moov: &Atom, mp4: &mut Mp4File) -> Result<()> {
        for child in self.read_children(moov)? {
            match child.atom_type {
                AtomType::MVHD => self.parse_mvhd(&child, mp4)?,
                AtomType::TRAK => {
                    let track = match self.parse_trak(&child) {
                        Ok(track) => track,
                        Err(e) => {
                            tracing::debug!(error = %e, "Skipping unreadable track");
                            continue;
                        }
                    };
                    match track.handler_type {
                        HandlerType::Video if mp4.video_track.is_none() => {
                            mp4.video_track = Some(track);
                        }
                        HandlerType::Meta if mp4.metadata_track.is_none() => {
                            mp4.metadata_track = Some(track);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse mvhd (movie header).
    fn parse_mvhd(&mut self, atom: &Atom, mp4: &mut Mp4File) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let (timescale, duration) = match data.first() {
            Some(0) => (be_u32(&data, 12), be_u32(&data, 16).map(u64::from)),
            Some(_) => (be_u32(&data, 20), be_u64(&data, 24)),
            None => return Ok(()),
        };
        if let (Some(timescale), Some(duration)) = (timescale, duration) {
            mp4.timescale = timescale;
            mp4.duration = duration;
        }
        Ok(())
    }

    fn parse_trak(&mut self, trak: &Atom) -> Result<TrackInfo> {
        let mut track = TrackInfo::new(0);
        for child in self.read_children(trak)? {
            match child.atom_type {
                AtomType::TKHD => self.parse_tkhd(&child, &mut track)?,
                AtomType::MDIA => self.parse_mdia(&child, &mut track)?,
                _ => {}
            }
        }
        Ok(track)
    }

    /// Parse tkhd (track header).
    fn parse_tkhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let (id_at, dims_at) = match data.first() {
            Some(0) => (12, 76),
            Some(_) => (20, 88),
            None => return Ok(()),
        };
        if let Some(id) = be_u32(&data, id_at) {
            track.track_id = id;
        }
        // Width and height are 16.16 fixed point.
        if let (Some(w), Some(h)) = (be_u32(&data, dims_at), be_u32(&data, dims_at + 4)) {
            track.width = Some(w >> 16);
            track.height = Some(h >> 16);
        }
        Ok(())
    }

    fn parse_mdia(&mut self, mdia: &Atom, track: &mut TrackInfo) -> Result<()> {
        let children = self.read_children(mdia)?;

        // hdlr decides how stsd is read, so handle it before minf.
        for child in children.iter().filter(|c| c.atom_type != AtomType::MINF) {
            match child.atom_type {
                AtomType::MDHD => self.parse_mdhd(child, track)?,
                AtomType::HDLR => self.parse_hdlr(child, track)?,
                _ => {}
            }
        }
        if let Some(minf) = children.iter().find(|c| c.atom_type == AtomType::MINF) {
            self.parse_minf(minf, track)?;
        }
        Ok(())
    }

    /// Parse mdhd (media header).
    fn parse_mdhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let (timescale, duration) = match data.first() {
            Some(0) => (be_u32(&data, 12), be_u32(&data, 16).map(u64::from)),
            Some(_) => (be_u32(&data, 20), be_u64(&data, 24)),
            None => return Ok(()),
        };
        if let Some(timescale) = timescale {
            track.timescale = timescale;
        }
        if let Some(duration) = duration {
            track.duration = duration;
        }
        Ok(())
    }

    /// Parse hdlr (handler) atom.
    fn parse_hdlr(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        if let Some(code) = fourcc(&data, 8) {
            track.handler_type = HandlerType::from_bytes(code);
        }
        Ok(())
    }

    fn parse_minf(&mut self, minf: &Atom, track: &mut TrackInfo) -> Result<()> {
        for child in self.read_children(minf)? {
            if child.atom_type == AtomType::STBL {
                self.parse_stbl(&child, track)?;
            }
        }
        Ok(())
    }

    /// Parse stbl (sample table) atom.
    fn parse_stbl(&mut self, stbl: &Atom, track: &mut TrackInfo) -> Result<()> {
        let mut builder = SampleTableBuilder::new();

        for child in self.read_children(stbl)? {
            if child.atom_type == AtomType::STSD {
                self.parse_stsd(&child, track)?;
                continue;
            }

            let data = match child.atom_type {
                AtomType::STTS
                | AtomType::STSS
                | AtomType::STSC
                | AtomType::STSZ
                | AtomType::STCO
                | AtomType::CO64
                | AtomType::CTTS => self.read_atom_data(&child)?,
                _ => continue,
            };

            match child.atom_type {
                AtomType::STTS => builder.set_stts(table_entries(&data, 8, |at| {
                    Some((be_u32(&data, at)?, be_u32(&data, at + 4)?))
                })),
                AtomType::STSS => builder.set_sync_samples(table_entries(&data, 4, |at| {
                    be_u32(&data, at)
                })),
                AtomType::STSC => builder.set_stsc(table_entries(&data, 12, |at| {
                    Some((
                        be_u32(&data, at)?,
                        be_u32(&data, at + 4)?,
                        be_u32(&data, at + 8)?,
                    ))
                })),
                AtomType::STSZ => {
                    let uniform = be_u32(&data, 4).unwrap_or(0);
                    let count = be_u32(&data, 8).unwrap_or(0) as usize;
                    let sizes = if uniform == 0 {
                        (0..count)
                            .map_while(|i| be_u32(&data, 12 + i * 4))
                            .collect()
                    } else {
                        Vec::new()
                    };
                    builder.set_stsz(uniform, sizes);
                }
                AtomType::STCO => builder.set_chunk_offsets(table_entries(&data, 4, |at| {
                    be_u32(&data, at).map(u64::from)
                })),
                AtomType::CO64 => {
                    builder.set_chunk_offsets(table_entries(&data, 8, |at| be_u64(&data, at)))
                }
                AtomType::CTTS => {
                    // Version 0 stores unsigned offsets, version 1 signed.
                    let signed = data.first().copied().unwrap_or(0) != 0;
                    builder.set_ctts(table_entries(&data, 8, |at| {
                        let raw = be_u32(&data, at + 4)?;
                        let offset = if signed {
                            raw as i32
                        } else {
                            raw.min(i32::MAX as u32) as i32
                        };
                        Some((be_u32(&data, at)?, offset))
                    }))
                }
                _ => {}
            }
        }

        track.sample_table = builder.build();
        Ok(())
    }

    /// Parse stsd (sample description): sample entry code plus codec
    /// configuration for video or MIME format for timed metadata.
    fn parse_stsd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        // version/flags (4) + entry count (4), then the first entry's box header.
        track.sample_entry = fourcc(&data, 12);

        if track.handler_type.is_video() {
            // Visual sample entry fields end at 8 + 8 + 78 = 94; child boxes follow.
            if let (Some(w), Some(h)) = (be_u16(&data, 40), be_u16(&data, 42)) {
                track.width.get_or_insert(w as u32);
                track.height.get_or_insert(h as u32);
            }
            let mut pos = 94;
            while let (Some(size), Some(kind)) = (be_u32(&data, pos), fourcc(&data, pos + 4)) {
                let size = size as usize;
                if size < 8 || pos + size > data.len() {
                    break;
                }
                if &kind == b"avcC" || &kind == b"hvcC" {
                    track.codec_data = Some(data[pos + 8..pos + size].to_vec());
                    break;
                }
                pos += size;
            }
        }

        if track.handler_type.is_metadata() && track.sample_entry == Some(AtomType::METT.0) {
            // reserved (6) + data_reference_index (2) precede the strings.
            if let Some((_encoding, next)) = c_string(&data, 24) {
                track.mime_format = c_string(&data, next).map(|(mime, _)| mime);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_be_helpers_bounds() {
        let data = [0u8, 0, 0, 7, 1, 2];
        assert_eq!(be_u32(&data, 0), Some(7));
        assert_eq!(be_u32(&data, 3), None);
        assert_eq!(be_u16(&data, 4), Some(0x0102));
        assert_eq!(be_u64(&data, 0), None);
    }

    #[test]
    fn test_table_entries_truncated() {
        // Claims 3 entries but only carries 2.
        let data = [0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, 1, 0, 0, 0, 2];
        let entries = table_entries(&data, 4, |at| be_u32(&data, at));
        assert_eq!(entries, vec![1, 2]);
    }

    #[test]
    fn test_c_string() {
        let data = b"\0application/json\0tail";
        let (first, next) = c_string(data, 0).unwrap();
        assert_eq!(first, "");
        let (second, _) = c_string(data, next).unwrap();
        assert_eq!(second, "application/json");
        assert!(c_string(b"no terminator", 0).is_none());
    }

    #[test]
    fn test_missing_moov() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16u32.to_be_bytes());
        bytes.extend_from_slice(b"ftyp");
        bytes.extend_from_slice(b"isom");
        bytes.extend_from_slice(&0u32.to_be_bytes());

        let mut reader = Mp4Reader::new(std::io::Cursor::new(bytes));
        assert!(matches!(reader.parse(), Err(Error::MissingAtom("moov"))));
    }
}
