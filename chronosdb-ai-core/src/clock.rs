//! Clock abstraction.
//!
//! Every component that needs "now" takes a `Arc<dyn Clock>` rather than
//! calling `SystemTime::now()` directly, so that rolling-window pruning,
//! cooldown expiry, and scheduler ticking can be driven deterministically
//! in tests. [`SystemClock`] is the production implementation;
//! [`ManualClock`] is a test double gated behind the `test-util` feature.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of wall-clock microseconds and a monotonic instant.
///
/// `now_us` is used for event timestamps (comparable across process
/// restarts, persisted to disk). `now_instant` is used only for the
/// Response Engine's cooldown clock, which must never go backwards even if
/// the wall clock is adjusted.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> u64;
    fn now_instant(&self) -> Instant;
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }

    fn now_instant(&self) -> Instant {
        Instant::now()
    }
}

/// A manually-advanced clock for deterministic tests.
///
/// `now_instant` is derived from a fixed base `Instant` plus the same
/// microsecond offset as `now_us`, so cooldown-duration math in tests
/// behaves exactly as it would against a real monotonic clock.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    micros: AtomicU64,
}

#[cfg(any(test, feature = "test-util"))]
impl ManualClock {
    #[must_use]
    pub fn new(start_us: u64) -> Self {
        Self {
            base: Instant::now(),
            micros: AtomicU64::new(start_us),
        }
    }

    pub fn advance_us(&self, delta_us: u64) {
        self.micros.fetch_add(delta_us, Ordering::SeqCst);
    }

    pub fn set_us(&self, value_us: u64) {
        self.micros.store(value_us, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }

    fn now_instant(&self) -> Instant {
        self.base + std::time::Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_us(), 1_000);
        clock.advance_us(500);
        assert_eq!(clock.now_us(), 1_500);
    }

    #[test]
    fn manual_clock_instant_tracks_micros() {
        let clock = ManualClock::new(0);
        let t0 = clock.now_instant();
        clock.advance_us(10_000);
        let t1 = clock.now_instant();
        assert!(t1 >= t0 + std::time::Duration::from_micros(9_999));
    }
}
