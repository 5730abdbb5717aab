//! Metatrack-Common: Shared time, sample, and identifier types.
//!
//! This crate provides functionality used by every metatrack component:
//!
//! - **Media time**: `MediaTime`, an exact rational timestamp (value / timescale)
//! - **Time base**: `TimeBase` maps raw capture clock readings onto a
//!   session-relative presentation timeline
//! - **Samples**: `TimedSample`, an opaque payload stamped with a presentation time
//! - **Typed IDs**: Type-safe UUID wrappers for stored assets and capture sessions
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use metatrack_common::{MediaTime, TimedSample};
//!
//! let half = MediaTime::new(300, 600);
//! assert_eq!(half, MediaTime::from_millis(500));
//!
//! let sample = TimedSample::new(&b"hello"[..], half);
//! assert_eq!(sample.presentation_time().as_secs_f64(), 0.5);
//! ```

pub mod error;
pub mod ids;
pub mod sample;
pub mod time;

pub use error::{Error, Result};
pub use ids::*;
pub use sample::TimedSample;
pub use time::{Clock, ManualClock, MediaTime, SystemClock, TimeBase};
