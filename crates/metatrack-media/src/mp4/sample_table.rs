//! MP4 sample table resolution.
//!
//! Sample tables describe how samples are laid out in the file:
//! - stts: decode time deltas
//! - ctts: composition offsets (presentation = decode + offset)
//! - stss: sync samples (absent means every sample is sync)
//! - stsc: sample-to-chunk runs
//! - stsz: sample sizes
//! - stco/co64: chunk offsets

use std::collections::HashSet;

/// A resolved sample entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// Sample index (0-based).
    pub index: u32,
    /// File offset where sample data starts.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Decode timestamp in media timescale.
    pub dts: u64,
    /// Composition time offset.
    pub cts_offset: i32,
    pub is_keyframe: bool,
}

impl SampleEntry {
    /// Presentation timestamp in media timescale.
    pub fn pts(&self) -> u64 {
        (self.dts as i64 + self.cts_offset as i64).max(0) as u64
    }
}

/// Resolved sample information for one track.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    pub sample_count: u32,
    pub samples: Vec<SampleEntry>,
}

impl SampleTable {
    pub fn builder() -> SampleTableBuilder {
        SampleTableBuilder::new()
    }

    pub fn get(&self, index: u32) -> Option<&SampleEntry> {
        self.samples.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleEntry> {
        self.samples.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Indices of sync samples.
    pub fn keyframe_indices(&self) -> Vec<u32> {
        self.samples
            .iter()
            .filter(|s| s.is_keyframe)
            .map(|s| s.index)
            .collect()
    }

    /// Total payload bytes across all samples.
    pub fn total_size(&self) -> u64 {
        self.samples.iter().map(|s| s.size as u64).sum()
    }
}

/// Accumulates raw table atoms and resolves them into a [`SampleTable`].
#[derive(Debug, Default)]
pub struct SampleTableBuilder {
    stts_entries: Vec<(u32, u32)>,
    sync_samples: Vec<u32>,
    stsc_entries: Vec<(u32, u32, u32)>,
    uniform_size: u32,
    sample_sizes: Vec<u32>,
    chunk_offsets: Vec<u64>,
    ctts_entries: Vec<(u32, i32)>,
}

impl SampleTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set stts entries as `(count, delta)`.
    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    /// Set stss entries (1-based sample numbers).
    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = samples;
    }

    /// Set stsc entries as `(first_chunk, samples_per_chunk, description_index)`.
    pub fn set_stsc(&mut self, entries: Vec<(u32, u32, u32)>) {
        self.stsc_entries = entries;
    }

    /// Set stsz data. A non-zero `uniform_size` applies to every sample.
    pub fn set_stsz(&mut self, uniform_size: u32, sizes: Vec<u32>) {
        self.uniform_size = uniform_size;
        self.sample_sizes = sizes;
    }

    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    /// Set ctts entries as `(count, offset)`.
    pub fn set_ctts(&mut self, entries: Vec<(u32, i32)>) {
        self.ctts_entries = entries;
    }

    /// Resolve per-sample offsets, sizes and timestamps.
    pub fn build(self) -> SampleTable {
        let sample_count = if self.uniform_size > 0 {
            self.total_stts_samples() as u32
        } else {
            self.sample_sizes.len() as u32
        };
        if sample_count == 0 {
            return SampleTable::default();
        }

        let n = sample_count as usize;
        let size_of = |i: usize| {
            if self.uniform_size > 0 {
                self.uniform_size
            } else {
                self.sample_sizes.get(i).copied().unwrap_or(0)
            }
        };

        let chunks = self.resolve_sample_chunks(n);
        let decode_times = self.resolve_decode_times(n);
        let cts_offsets = expand_runs(&self.ctts_entries, n, 0);
        let sync_set: HashSet<u32> = self.sync_samples.iter().copied().collect();

        // Running byte position inside each chunk.
        let mut chunk_fill = vec![0u64; self.chunk_offsets.len()];
        let mut samples = Vec::with_capacity(n);

        for i in 0..n {
            let size = size_of(i);
            let chunk = chunks[i] as usize;
            let base = self.chunk_offsets.get(chunk).copied().unwrap_or(0);
            let within = chunk_fill.get(chunk).copied().unwrap_or(0);
            if let Some(fill) = chunk_fill.get_mut(chunk) {
                *fill += size as u64;
            }

            samples.push(SampleEntry {
                index: i as u32,
                offset: base + within,
                size,
                dts: decode_times[i],
                cts_offset: cts_offsets[i],
                is_keyframe: self.sync_samples.is_empty() || sync_set.contains(&(i as u32 + 1)),
            });
        }

        SampleTable {
            sample_count,
            samples,
        }
    }

    fn total_stts_samples(&self) -> usize {
        self.stts_entries.iter().map(|(count, _)| *count as usize).sum()
    }

    /// Zero-based chunk index for each sample.
    fn resolve_sample_chunks(&self, n: usize) -> Vec<u32> {
        let num_chunks = self.chunk_offsets.len() as u32;
        let mut result = Vec::with_capacity(n);

        for (i, &(first_chunk, per_chunk, _)) in self.stsc_entries.iter().enumerate() {
            let next_first = self
                .stsc_entries
                .get(i + 1)
                .map(|e| e.0)
                .unwrap_or(num_chunks + 1);
            for chunk in first_chunk..next_first.min(num_chunks + 1) {
                let take = (per_chunk as usize).min(n - result.len());
                result.extend(std::iter::repeat(chunk.saturating_sub(1)).take(take));
            }
        }

        let last = result.last().copied().unwrap_or(0);
        result.resize(n, last);
        result
    }

    fn resolve_decode_times(&self, n: usize) -> Vec<u64> {
        let deltas = expand_runs(&self.stts_entries, n, 0);
        let mut current = 0u64;
        deltas
            .into_iter()
            .map(|delta| {
                let dts = current;
                current += delta as u64;
                dts
            })
            .collect()
    }
}

/// Expand `(count, value)` runs to exactly `n` values, padding with `pad`.
fn expand_runs<T: Copy>(runs: &[(u32, T)], n: usize, pad: T) -> Vec<T> {
    let mut out: Vec<T> = runs
        .iter()
        .flat_map(|&(count, value)| std::iter::repeat(value).take(count as usize))
        .take(n)
        .collect();
    out.resize(n, pad);
    out
}
