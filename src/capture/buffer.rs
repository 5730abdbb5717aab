//! Bounded queue of stamped metadata samples awaiting mux.
//!
//! Producers (capture callbacks) enqueue; the recording worker drains at
//! flush points. The last accepted presentation time survives drains, so
//! ordering is enforced across the whole session, not per flush.

use super::CapturePhase;
use crate::config::Backpressure;
use crate::{Error, Result};
use metatrack_common::{MediaTime, TimedSample};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    samples: VecDeque<TimedSample>,
    last_time: Option<MediaTime>,
}

#[derive(Debug)]
pub struct MetadataSampleBuffer {
    inner: Mutex<Inner>,
    /// Signalled whenever a drain frees space or the buffer closes.
    space: Condvar,
    /// Set without the lock so closing never waits on a producer.
    closed: AtomicBool,
    capacity: usize,
    policy: Backpressure,
    block_timeout: Duration,
}

impl MetadataSampleBuffer {
    pub fn new(capacity: usize, policy: Backpressure, block_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            space: Condvar::new(),
            closed: AtomicBool::new(false),
            capacity: capacity.max(1),
            policy,
            block_timeout,
        }
    }

    /// A fail-fast buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity, Backpressure::FailFast, Duration::ZERO)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> Backpressure {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.inner.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Append an already stamped sample.
    pub fn enqueue(&self, sample: TimedSample) -> Result<()> {
        self.enqueue_with(move || Ok(sample)).map(|_| ())
    }

    /// Append a sample produced by `stamp` once space is available.
    ///
    /// `stamp` runs with the buffer locked, so samples stamped from a
    /// monotonic clock are accepted in stamp order. Returns the accepted
    /// sample's presentation time.
    pub fn enqueue_with<F>(&self, stamp: F) -> Result<MediaTime>
    where
        F: FnOnce() -> Result<TimedSample>,
    {
        let mut inner = self.inner.lock();
        let deadline = Instant::now() + self.block_timeout;

        while inner.samples.len() >= self.capacity && !self.is_closed() {
            match self.policy {
                Backpressure::FailFast => {
                    return Err(Error::BufferFull {
                        capacity: self.capacity,
                    })
                }
                Backpressure::Block => {
                    if self.space.wait_until(&mut inner, deadline).timed_out()
                        && inner.samples.len() >= self.capacity
                    {
                        return Err(Error::BufferFull {
                            capacity: self.capacity,
                        });
                    }
                }
            }
        }

        if self.is_closed() {
            return Err(Error::InvalidTransition {
                phase: CapturePhase::Finishing,
                action: "enqueue metadata",
            });
        }

        let sample = stamp()?;
        let time = sample.presentation_time();
        if let Some(last) = inner.last_time {
            if time < last {
                return Err(Error::OutOfOrder { last, got: time });
            }
        }

        inner.last_time = Some(time);
        inner.samples.push_back(sample);
        Ok(time)
    }

    /// Remove and return everything queued, in enqueue order.
    pub fn drain(&self) -> Vec<TimedSample> {
        let drained: Vec<_> = self.inner.lock().samples.drain(..).collect();
        self.space.notify_all();
        drained
    }

    /// Like [`drain`](Self::drain), but gives up if the lock cannot be
    /// acquired within `timeout`.
    pub fn drain_timeout(&self, timeout: Duration) -> Option<Vec<TimedSample>> {
        let drained: Vec<_> = self.inner.try_lock_for(timeout)?.samples.drain(..).collect();
        self.space.notify_all();
        Some(drained)
    }

    /// Stop accepting samples and wake blocked producers.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.space.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn sample(payload: &'static str, millis: i64) -> TimedSample {
        TimedSample::new(payload.as_bytes(), MediaTime::from_millis(millis))
    }

    #[test]
    fn test_drain_preserves_order_and_ties() {
        let buffer = MetadataSampleBuffer::with_capacity(8);
        let input = vec![sample("a", 0), sample("b", 10), sample("c", 10), sample("d", 20)];
        for s in input.clone() {
            buffer.enqueue(s).unwrap();
        }
        assert_eq!(buffer.drain(), input);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_rejects_decreasing_time_across_drains() {
        let buffer = MetadataSampleBuffer::with_capacity(8);
        buffer.enqueue(sample("a", 100)).unwrap();
        buffer.drain();

        let err = buffer.enqueue(sample("b", 50)).unwrap_err();
        assert_matches!(err, Error::OutOfOrder { .. });
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fail_fast_full_keeps_contents() {
        let buffer = MetadataSampleBuffer::with_capacity(2);
        buffer.enqueue(sample("A", 0)).unwrap();
        buffer.enqueue(sample("B", 1)).unwrap();

        assert_matches!(
            buffer.enqueue(sample("C", 2)),
            Err(Error::BufferFull { capacity: 2 })
        );
        assert_eq!(buffer.drain(), vec![sample("A", 0), sample("B", 1)]);
    }

    #[test]
    fn test_full_buffer_does_not_run_stamp() {
        let buffer = MetadataSampleBuffer::with_capacity(1);
        buffer.enqueue(sample("A", 0)).unwrap();
        let mut stamped = false;
        let result = buffer.enqueue_with(|| {
            stamped = true;
            Ok(sample("B", 1))
        });
        assert!(result.is_err());
        assert!(!stamped);
    }

    #[test]
    fn test_block_times_out() {
        let buffer = MetadataSampleBuffer::new(1, Backpressure::Block, Duration::from_millis(20));
        buffer.enqueue(sample("A", 0)).unwrap();

        let started = Instant::now();
        assert_matches!(buffer.enqueue(sample("B", 1)), Err(Error::BufferFull { .. }));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_block_resumes_after_drain() {
        let buffer = Arc::new(MetadataSampleBuffer::new(
            1,
            Backpressure::Block,
            Duration::from_secs(5),
        ));
        buffer.enqueue(sample("A", 0)).unwrap();

        let producer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || buffer.enqueue(sample("B", 1)))
        };
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(buffer.drain(), vec![sample("A", 0)]);

        producer.join().unwrap().unwrap();
        assert_eq!(buffer.drain(), vec![sample("B", 1)]);
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let buffer = Arc::new(MetadataSampleBuffer::new(
            1,
            Backpressure::Block,
            Duration::from_secs(5),
        ));
        buffer.enqueue(sample("A", 0)).unwrap();

        let producer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || buffer.enqueue(sample("B", 1)))
        };
        std::thread::sleep(Duration::from_millis(20));
        buffer.close();

        assert_matches!(
            producer.join().unwrap(),
            Err(Error::InvalidTransition { .. })
        );
        // Queued samples are still drained after close.
        assert_eq!(buffer.drain_timeout(Duration::from_millis(10)).unwrap().len(), 1);
    }

    #[test]
    fn test_close_does_not_wait_for_lock() {
        let buffer = MetadataSampleBuffer::with_capacity(1);
        let _held = buffer.inner.lock();
        buffer.close();
        assert!(buffer.is_closed());
    }

    #[test]
    fn test_drain_timeout_when_locked() {
        let buffer = MetadataSampleBuffer::with_capacity(1);
        let _held = buffer.inner.lock();
        assert!(buffer.drain_timeout(Duration::from_millis(10)).is_none());
    }
}
