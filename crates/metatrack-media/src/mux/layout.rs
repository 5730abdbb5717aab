//! Per-track sample layout accumulated while writing `mdat`.

use crate::{Error, Result};

/// Where each sample of one track landed in the file, and when it plays.
#[derive(Debug, Default)]
pub(crate) struct TrackLayout {
    /// Presentation time of each sample, in container ticks.
    pts: Vec<i64>,
    sizes: Vec<u32>,
    /// 1-based sync sample numbers.
    sync: Vec<u32>,
    /// `(file offset, sample count)` per chunk.
    chunks: Vec<(u64, u32)>,
}

impl TrackLayout {
    /// Record a sample written at `offset`. `continues_chunk` is true when
    /// the previous sample in the file belongs to this track.
    pub fn push(&mut self, offset: u64, size: u32, pts: i64, is_sync: bool, continues_chunk: bool) {
        self.pts.push(pts);
        self.sizes.push(size);
        if is_sync {
            self.sync.push(self.pts.len() as u32);
        }
        match self.chunks.last_mut() {
            Some((_, count)) if continues_chunk => *count += 1,
            _ => self.chunks.push((offset, 1)),
        }
    }

    pub fn len(&self) -> usize {
        self.pts.len()
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn chunk_offsets(&self) -> Vec<u64> {
        self.chunks.iter().map(|(offset, _)| *offset).collect()
    }

    /// stss entries, or `None` when every sample is a sync sample.
    pub fn sync_samples(&self) -> Option<&[u32]> {
        if self.sync.len() == self.pts.len() {
            None
        } else {
            Some(&self.sync)
        }
    }

    /// stsc entries, merging consecutive chunks of equal size.
    pub fn stsc_entries(&self) -> Vec<(u32, u32, u32)> {
        let mut entries: Vec<(u32, u32, u32)> = Vec::new();
        for (i, (_, count)) in self.chunks.iter().enumerate() {
            if entries.last().map(|e| e.1) != Some(*count) {
                entries.push((i as u32 + 1, *count, 1));
            }
        }
        entries
    }

    /// Constant composition offset: the first sample's presentation time.
    /// Decode times start at zero, so this shifts the track into place.
    pub fn composition_offset(&self) -> Result<i32> {
        let first = self.pts.first().copied().unwrap_or(0);
        i32::try_from(first).map_err(|_| {
            Error::out_of_range(format!("track start {} ticks exceeds composition offset", first))
        })
    }

    /// stts entries; the last sample lasts until `end`.
    pub fn decode_deltas(&self, end: i64) -> Result<Vec<(u32, u32)>> {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        let nexts = self.pts.iter().skip(1).copied().chain(std::iter::once(end));
        for (pts, next) in self.pts.iter().zip(nexts) {
            let delta = u32::try_from(next - pts).map_err(|_| {
                Error::out_of_range(format!("sample delta {} ticks at {}", next - pts, pts))
            })?;
            match runs.last_mut() {
                Some((count, d)) if *d == delta => *count += 1,
                _ => runs.push((1, delta)),
            }
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_split_on_track_switch() {
        let mut layout = TrackLayout::default();
        layout.push(100, 10, 0, true, false);
        layout.push(110, 10, 20, false, true);
        layout.push(500, 10, 40, true, false);

        assert_eq!(layout.chunk_offsets(), vec![100, 500]);
        assert_eq!(layout.stsc_entries(), vec![(1, 2, 1), (2, 1, 1)]);
        assert_eq!(layout.sync_samples(), Some(&[1u32, 3][..]));
    }

    #[test]
    fn test_stsc_merges_equal_runs() {
        let mut layout = TrackLayout::default();
        layout.push(0, 1, 0, true, false);
        layout.push(10, 1, 1, true, false);
        layout.push(20, 1, 2, true, false);
        assert_eq!(layout.stsc_entries(), vec![(1, 1, 1)]);
        assert!(layout.sync_samples().is_none());
    }

    #[test]
    fn test_decode_deltas_run_length() {
        let mut layout = TrackLayout::default();
        for (i, pts) in [30, 50, 70, 70].iter().enumerate() {
            layout.push(i as u64, 1, *pts, true, true);
        }
        assert_eq!(layout.composition_offset().unwrap(), 30);
        assert_eq!(
            layout.decode_deltas(100).unwrap(),
            vec![(2, 20), (1, 0), (1, 30)]
        );
    }

    #[test]
    fn test_empty_layout() {
        let layout = TrackLayout::default();
        assert_eq!(layout.len(), 0);
        assert!(layout.decode_deltas(0).unwrap().is_empty());
        assert!(layout.stsc_entries().is_empty());
        assert_eq!(layout.composition_offset().unwrap(), 0);
    }
}
