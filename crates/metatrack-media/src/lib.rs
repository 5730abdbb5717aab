//! Metatrack-Media: timed-metadata muxing and MP4 track reading
//!
//! This crate writes and reads the container that carries a recorded video
//! elementary stream alongside an application metadata track.
//!
//! # Modules
//!
//! - `mp4` - MP4 container parsing (moov, sample tables, sample entries)
//! - `mux` - Interleaving muxer that finalizes a recording into one file
//! - `asset` - The finalized, read-only `MuxedAsset`
//!
//! # Layout
//!
//! A finalized asset is written as:
//!
//! 1. `ftyp`
//! 2. `mdat` holding video and metadata samples interleaved by presentation
//!    time: every metadata sample precedes the first video sample whose
//!    presentation time is at or after its own
//! 3. `moov` with a `vide` track and a `meta` track sharing one timescale,
//!    so any ISO-BMFF reader can recover `(payload, time)` pairs for the
//!    metadata track on its own

pub mod asset;
pub mod error;
pub mod mp4;
pub mod mux;

pub use asset::{AssetFile, MuxedAsset};
pub use error::{Error, Result};
pub use mp4::Mp4File;
pub use mux::{CodecConfig, MuxerConfig, SpooledFrame, TrackMuxer, VideoFormat, VideoStream};
