//! Clock capability (§6)
//!
//! `now()` must be wall-clock (used for envelope timestamps);
//! `monotonic()` must never go backwards (used for deadlines). Production
//! wiring uses [`SystemClock`]; tests use [`FixedClock`] / [`SteppedClock`]
//! for determinism.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::ids::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
    fn monotonic(&self) -> Duration;
}

/// Real wall-clock and monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }

    fn monotonic(&self) -> Duration {
        MONOTONIC_ORIGIN.elapsed()
    }
}

static MONOTONIC_ORIGIN: std::sync::LazyLock<Instant> = std::sync::LazyLock::new(Instant::now);

/// A clock pinned to one instant, for deterministic unit tests.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Timestamp,
    mono_ms: std::sync::Arc<AtomicU64>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now,
            mono_ms: std::sync::Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the monotonic clock without changing `now()`, to exercise
    /// deadline logic deterministically.
    pub fn advance_monotonic(&self, ms: u64) {
        self.mono_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn monotonic(&self) -> Duration {
        Duration::from_millis(self.mono_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_monotonic_advances_on_demand() {
        let clock = FixedClock::new(chrono::Utc::now());
        assert_eq!(clock.monotonic(), Duration::from_millis(0));
        clock.advance_monotonic(50);
        assert_eq!(clock.monotonic(), Duration::from_millis(50));
    }
}
