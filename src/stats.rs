//! # Per-Connection Statistics
//!
//! Six signed 64-bit counters behind a `parking_lot::Mutex`, snapshotted by value so
//! callers never hold the lock across a computation. Supplements the four counters
//! spec.md names (`sent_packets`, `sent_octets`, `received_packets`,
//! `received_octets`) with `errors` and `timeouts`, carried over from
//! `original_source/src/stats.hpp`, which the distilled spec dropped.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub sent_packets: i64,
    pub sent_octets: i64,
    pub received_packets: i64,
    pub received_octets: i64,
    pub errors: i64,
    pub timeouts: i64,
}

impl std::ops::Add for Counters {
    type Output = Counters;
    fn add(self, rhs: Counters) -> Counters {
        Counters {
            sent_packets: self.sent_packets + rhs.sent_packets,
            sent_octets: self.sent_octets + rhs.sent_octets,
            received_packets: self.received_packets + rhs.received_packets,
            received_octets: self.received_octets + rhs.received_octets,
            errors: self.errors + rhs.errors,
            timeouts: self.timeouts + rhs.timeouts,
        }
    }
}

impl std::ops::Sub for Counters {
    type Output = Counters;
    fn sub(self, rhs: Counters) -> Counters {
        Counters {
            sent_packets: self.sent_packets - rhs.sent_packets,
            sent_octets: self.sent_octets - rhs.sent_octets,
            received_packets: self.received_packets - rhs.received_packets,
            received_octets: self.received_octets - rhs.received_octets,
            errors: self.errors - rhs.errors,
            timeouts: self.timeouts - rhs.timeouts,
        }
    }
}

/// A point-in-time read of a connection's counters paired with the instant it was
/// taken, so `delta()` callers can derive rates without a second clock read racing
/// against the snapshot itself.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub counters: Counters,
    pub at: Instant,
}

impl Snapshot {
    /// Counter deltas and elapsed wall-clock time since `earlier`. Negative deltas
    /// can occur if `earlier` was taken after `self`; callers are expected to pass
    /// snapshots in chronological order.
    pub fn delta(&self, earlier: &Snapshot) -> (Counters, Duration) {
        (self.counters - earlier.counters, self.at.saturating_duration_since(earlier.at))
    }
}

/// Lock-protected running totals for one connection. Cheap to update from the
/// worker thread that owns the connection; cheap to read from the status-reporting
/// thread via `snapshot()`.
pub struct Statistics {
    inner: Mutex<Counters>,
    start: Instant,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters::default()),
            start: Instant::now(),
        }
    }

    pub fn record_sent(&self, packets: i64, octets: i64) {
        let mut c = self.inner.lock();
        c.sent_packets += packets;
        c.sent_octets += octets;
    }

    pub fn record_received(&self, packets: i64, octets: i64) {
        let mut c = self.inner.lock();
        c.received_packets += packets;
        c.received_octets += octets;
    }

    pub fn record_error(&self) {
        self.inner.lock().errors += 1;
    }

    pub fn record_timeout(&self) {
        self.inner.lock().timeouts += 1;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            counters: *self.inner.lock(),
            at: Instant::now(),
        }
    }

    /// Cumulative counters plus wall-clock time since construction.
    pub fn summary(&self) -> (Counters, Duration) {
        (*self.inner.lock(), self.start.elapsed())
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_reflects_interleaved_updates() {
        let stats = Statistics::new();
        stats.record_sent(1, 100);
        let first = stats.snapshot();
        stats.record_sent(2, 300);
        stats.record_received(1, 50);
        let second = stats.snapshot();

        let (delta, _) = second.delta(&first);
        assert_eq!(delta.sent_packets, 2);
        assert_eq!(delta.sent_octets, 300);
        assert_eq!(delta.received_packets, 1);
        assert_eq!(delta.received_octets, 50);
    }

    #[test]
    fn errors_and_timeouts_are_independent_of_throughput_counters() {
        let stats = Statistics::new();
        stats.record_error();
        stats.record_timeout();
        stats.record_timeout();
        let (counters, _) = stats.summary();
        assert_eq!(counters.errors, 1);
        assert_eq!(counters.timeouts, 2);
        assert_eq!(counters.sent_packets, 0);
    }

    #[test]
    fn counters_add_and_subtract_pointwise() {
        let a = Counters {
            sent_packets: 5,
            sent_octets: 500,
            received_packets: 3,
            received_octets: 300,
            errors: 1,
            timeouts: 0,
        };
        let b = Counters {
            sent_packets: 2,
            sent_octets: 200,
            received_packets: 1,
            received_octets: 100,
            errors: 0,
            timeouts: 1,
        };
        let sum = a + b;
        assert_eq!(sum.sent_packets, 7);
        assert_eq!(sum.timeouts, 1);
        let diff = a - b;
        assert_eq!(diff.sent_packets, 3);
        assert_eq!(diff.errors, 1);
    }
}
