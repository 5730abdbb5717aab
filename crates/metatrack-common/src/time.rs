//! Rational media time and the capture time base.
//!
//! `MediaTime` is an exact `value / timescale` timestamp. Comparisons are
//! exact across timescales (cross-multiplied in 128-bit), so `300/600`
//! equals `500/1000`.
//!
//! `TimeBase` anchors a session's presentation timeline to an epoch read
//! from a `Clock`. All presentation times it produces use the session
//! timescale, which is also the timescale written into the container.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

const NANOS_PER_SEC: i32 = 1_000_000_000;

/// An exact rational timestamp: `value / timescale` seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawMediaTime")]
pub struct MediaTime {
    value: i64,
    timescale: i32,
}

#[derive(Deserialize)]
struct RawMediaTime {
    value: i64,
    timescale: i32,
}

impl TryFrom<RawMediaTime> for MediaTime {
    type Error = Error;

    fn try_from(raw: RawMediaTime) -> Result<Self> {
        Self::try_new(raw.value, raw.timescale)
    }
}

impl MediaTime {
    /// Zero seconds.
    pub const ZERO: Self = Self {
        value: 0,
        timescale: 1,
    };

    /// Create a media time.
    ///
    /// # Panics
    ///
    /// Panics if `timescale` is not positive. Use [`MediaTime::try_new`] for
    /// untrusted input.
    pub const fn new(value: i64, timescale: i32) -> Self {
        assert!(timescale > 0, "timescale must be positive");
        Self { value, timescale }
    }

    /// Create a media time, rejecting non-positive timescales.
    pub fn try_new(value: i64, timescale: i32) -> Result<Self> {
        if timescale <= 0 {
            return Err(Error::invalid_input(format!(
                "timescale must be positive, got {}",
                timescale
            )));
        }
        Ok(Self { value, timescale })
    }

    /// Create from whole milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self::new(millis, 1000)
    }

    /// Create from whole nanoseconds.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self::new(nanos, NANOS_PER_SEC)
    }

    /// Create from floating point seconds, rounded to the nearest tick.
    pub fn from_secs_f64(secs: f64, timescale: i32) -> Self {
        Self::new((secs * timescale as f64).round() as i64, timescale)
    }

    /// Tick count.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Ticks per second.
    pub fn timescale(&self) -> i32 {
        self.timescale
    }

    /// Get the time in seconds.
    pub fn as_secs_f64(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    pub fn is_negative(&self) -> bool {
        self.value < 0
    }

    /// Express this time in another timescale, rounding to the nearest tick
    /// (halves away from zero). Exact when `timescale` is a multiple of the
    /// current one.
    pub fn rescale(self, timescale: i32) -> Result<Self> {
        if timescale <= 0 {
            return Err(Error::invalid_input(format!(
                "timescale must be positive, got {}",
                timescale
            )));
        }
        if timescale == self.timescale {
            return Ok(self);
        }
        let value = rescale_ratio(self.value as i128, self.timescale as i128, timescale)
            .ok_or_else(|| Error::overflow(format!("{} in timescale {}", self, timescale)))?;
        Ok(Self { value, timescale })
    }

    /// Exact difference `self - other`, expressed in `timescale`.
    pub fn sub_in(self, other: Self, timescale: i32) -> Result<Self> {
        let num = self.value as i128 * other.timescale as i128
            - other.value as i128 * self.timescale as i128;
        let den = self.timescale as i128 * other.timescale as i128;
        let value = rescale_ratio(num, den, timescale)
            .ok_or_else(|| Error::overflow(format!("{} - {}", self, other)))?;
        Self::try_new(value, timescale)
    }

    fn cross(&self, other: &Self) -> (i128, i128) {
        (
            self.value as i128 * other.timescale as i128,
            other.value as i128 * self.timescale as i128,
        )
    }
}

/// `num / den` seconds expressed in `timescale` ticks, rounded half away from zero.
fn rescale_ratio(num: i128, den: i128, timescale: i32) -> Option<i64> {
    let scaled = num.checked_mul(timescale as i128)?;
    let half = den / 2;
    let rounded = if scaled >= 0 {
        (scaled + half) / den
    } else {
        (scaled - half) / den
    };
    i64::try_from(rounded).ok()
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = self.cross(other);
        a == b
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.cross(other);
        a.cmp(&b)
    }
}

impl std::fmt::Display for MediaTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s ({}/{})", self.as_secs_f64(), self.value, self.timescale)
    }
}

/// Source of raw capture timestamps.
pub trait Clock: Send + Sync {
    /// Current raw capture time. Must never decrease.
    fn now(&self) -> MediaTime;
}

/// Monotonic host clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> MediaTime {
        let nanos = self.origin.elapsed().as_nanos().min(i64::MAX as u128) as i64;
        MediaTime::from_nanos(nanos)
    }
}

/// Externally driven clock, for tests and simulated capture.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute time.
    pub fn set(&self, time: MediaTime) {
        let nanos = time
            .rescale(NANOS_PER_SEC)
            .map(|t| t.value())
            .unwrap_or(i64::MAX);
        self.nanos.store(nanos, AtomicOrdering::SeqCst);
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: MediaTime) {
        let nanos = delta
            .rescale(NANOS_PER_SEC)
            .map(|t| t.value())
            .unwrap_or(0);
        self.nanos.fetch_add(nanos, AtomicOrdering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> MediaTime {
        MediaTime::from_nanos(self.nanos.load(AtomicOrdering::SeqCst))
    }
}

/// Maps capture clock readings onto a session's presentation timeline.
pub struct TimeBase {
    clock: Arc<dyn Clock>,
    timescale: i32,
    epoch: OnceLock<MediaTime>,
    /// Highest tick handed out by `now()`; keeps it non-decreasing.
    last: AtomicI64,
}

impl TimeBase {
    /// Create a time base producing presentation times in `timescale`.
    pub fn new(clock: Arc<dyn Clock>, timescale: i32) -> Result<Self> {
        if timescale <= 0 {
            return Err(Error::invalid_input(format!(
                "timescale must be positive, got {}",
                timescale
            )));
        }
        Ok(Self {
            clock,
            timescale,
            epoch: OnceLock::new(),
            last: AtomicI64::new(i64::MIN),
        })
    }

    /// Session timescale.
    pub fn timescale(&self) -> i32 {
        self.timescale
    }

    /// Raw clock reading, not anchored to the epoch.
    pub fn capture_now(&self) -> MediaTime {
        self.clock.now()
    }

    /// Anchor the session at the clock's current reading.
    ///
    /// Fails if an epoch was already established.
    pub fn establish_epoch(&self) -> Result<MediaTime> {
        let now = self.clock.now();
        self.epoch
            .set(now)
            .map_err(|_| Error::clock("session epoch already established"))?;
        Ok(now)
    }

    /// The session epoch, if established.
    pub fn epoch(&self) -> Option<MediaTime> {
        self.epoch.get().copied()
    }

    /// Current presentation time. Two calls never decrease.
    pub fn now(&self) -> Result<MediaTime> {
        let raw = self.clock.now();
        let relative = self.to_presentation(raw)?;
        let prev = self.last.fetch_max(relative.value(), AtomicOrdering::SeqCst);
        Ok(MediaTime::new(prev.max(relative.value()), self.timescale))
    }

    /// Map a raw capture timestamp to presentation time by subtracting the
    /// session epoch.
    pub fn to_presentation(&self, capture_time: MediaTime) -> Result<MediaTime> {
        let epoch = self
            .epoch()
            .ok_or_else(|| Error::clock("queried before the session epoch was established"))?;
        if capture_time < epoch {
            return Err(Error::clock(format!(
                "capture time {} precedes session epoch {}",
                capture_time, epoch
            )));
        }
        capture_time.sub_in(epoch, self.timescale)
    }
}

impl std::fmt::Debug for TimeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeBase")
            .field("timescale", &self.timescale)
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_time_base(timescale: i32) -> (Arc<ManualClock>, TimeBase) {
        let clock = Arc::new(ManualClock::new());
        let tb = TimeBase::new(clock.clone(), timescale).unwrap();
        (clock, tb)
    }

    #[test]
    fn test_media_time_cross_timescale_equality() {
        assert_eq!(MediaTime::new(300, 600), MediaTime::from_millis(500));
        assert!(MediaTime::new(1, 3) > MediaTime::from_millis(333));
        assert!(MediaTime::new(1, 3) < MediaTime::from_millis(334));
    }

    #[test]
    fn test_media_time_rescale_rounds_to_nearest() {
        let t = MediaTime::from_nanos(1_000_000);
        assert_eq!(t.rescale(600).unwrap().value(), 1);
        let t = MediaTime::from_nanos(-1_000_000);
        assert_eq!(t.rescale(600).unwrap().value(), -1);
        let t = MediaTime::from_millis(1500);
        assert_eq!(t.rescale(600).unwrap().value(), 900);
    }

    #[test]
    fn test_media_time_rejects_bad_timescale() {
        assert!(MediaTime::try_new(1, 0).is_err());
        assert!(MediaTime::from_millis(1).rescale(-5).is_err());
    }

    #[test]
    fn test_media_time_deserialize_validates() {
        let ok: MediaTime = serde_json::from_str(r#"{"value":3,"timescale":600}"#).unwrap();
        assert_eq!(ok, MediaTime::new(3, 600));
        assert!(serde_json::from_str::<MediaTime>(r#"{"value":3,"timescale":0}"#).is_err());
    }

    #[test]
    fn test_sub_in_exact() {
        let a = MediaTime::from_millis(1250);
        let b = MediaTime::new(300, 600);
        assert_eq!(a.sub_in(b, 600).unwrap(), MediaTime::new(450, 600));
    }

    #[test]
    fn test_now_before_epoch_is_clock_error() {
        let (_clock, tb) = manual_time_base(600);
        assert!(matches!(tb.now(), Err(Error::Clock(_))));
        assert!(matches!(
            tb.to_presentation(MediaTime::from_millis(5)),
            Err(Error::Clock(_))
        ));
    }

    #[test]
    fn test_epoch_established_once() {
        let (_clock, tb) = manual_time_base(600);
        tb.establish_epoch().unwrap();
        assert!(tb.establish_epoch().is_err());
    }

    #[test]
    fn test_now_is_relative_to_epoch() {
        let (clock, tb) = manual_time_base(600);
        clock.set(MediaTime::from_millis(10_000));
        tb.establish_epoch().unwrap();
        clock.advance(MediaTime::from_millis(500));
        assert_eq!(tb.now().unwrap(), MediaTime::new(300, 600));
        assert_eq!(tb.now().unwrap().timescale(), 600);
    }

    #[test]
    fn test_to_presentation_before_epoch_fails() {
        let (clock, tb) = manual_time_base(600);
        clock.set(MediaTime::from_millis(1000));
        tb.establish_epoch().unwrap();
        assert!(tb.to_presentation(MediaTime::from_millis(999)).is_err());
        assert_eq!(
            tb.to_presentation(MediaTime::from_millis(1000)).unwrap(),
            MediaTime::ZERO
        );
    }

    #[test]
    fn test_now_never_decreases() {
        let (clock, tb) = manual_time_base(600);
        clock.set(MediaTime::from_millis(100));
        tb.establish_epoch().unwrap();
        clock.set(MediaTime::from_millis(600));
        let first = tb.now().unwrap();
        // A misbehaving clock stepping backwards must not leak through.
        clock.set(MediaTime::from_millis(200));
        let second = tb.now().unwrap();
        assert!(second >= first);
        assert_eq!(second, first);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
