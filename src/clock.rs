//! Monotonic wall-clock source used to stamp Records.
//!
//! The engine never calls [`SystemTime::now`](std::time::SystemTime::now)
//! directly. Instead it is handed anything implementing [`Clock`], so tests
//! can supply deterministic or artificially-advancing timestamps without
//! sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of seconds-since-epoch timestamps.
///
/// Implementations must be monotonic non-decreasing for the engine's
/// tie-breaking rules in compaction to behave sensibly, though nothing in
/// the engine panics if that's violated — timestamps are just data.
pub trait Clock: Send + Sync {
    /// Returns the current time as seconds since the Unix epoch.
    fn now_secs(&self) -> i64;
}

/// The default [`Clock`] backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_secs() as i64
    }
}

/// A manually-advanced clock for deterministic tests.
///
/// Every call to [`now_secs`](Clock::now_secs) returns the last value set by
/// [`set`](FakeClock::set) or [`advance`](FakeClock::advance); it never
/// changes on its own.
#[derive(Debug)]
pub struct FakeClock {
    secs: AtomicI64,
}

impl FakeClock {
    /// Creates a fake clock starting at `secs`.
    pub fn new(secs: i64) -> Self {
        Self {
            secs: AtomicI64::new(secs),
        }
    }

    /// Overwrites the current reading.
    pub fn set(&self, secs: i64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    /// Advances the current reading by `delta` seconds and returns the new value.
    pub fn advance(&self, delta: i64) -> i64 {
        self.secs.fetch_add(delta, Ordering::SeqCst) + delta
    }
}

impl Clock for FakeClock {
    fn now_secs(&self) -> i64 {
        self.secs.load(Ordering::SeqCst)
    }
}
