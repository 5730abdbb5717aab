//! Metatrack - timed-metadata capture, recording and playback
//!
//! Records a video stream together with application metadata events,
//! muxes both into one MP4 with a dedicated metadata track, and replays
//! the metadata in step with video playback.
//!
//! This library crate exposes the core functionality for integration testing.

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod playback;
pub mod store;

pub use error::{Error, Result};
