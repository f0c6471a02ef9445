//! Clock abstractions used by admission gates.
//!
//! Gates only ever compare readings from the same clock, so a reading is an offset from
//! the clock's own origin rather than a wall-clock timestamp. System clock adjustments
//! therefore cannot cause over- or under-admission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Monotonic time source so gates can be driven deterministically in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Time elapsed since the clock's origin. Never decreases.
    fn now(&self) -> Duration;
}

/// Monotonic clock backed by `tokio::time::Instant`.
///
/// Notes: resets when the process restarts. Under a paused tokio runtime
/// (`start_paused = true`) it follows tokio's virtual time.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: tokio::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: tokio::time::Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Hand-driven clock for tests. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let delta = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self.nanos.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            Some(current.saturating_add(delta))
        });
    }

    /// Jump to an absolute reading. Readings never move backwards.
    pub fn set(&self, to: Duration) {
        let target = u64::try_from(to.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_max(target, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_shares_reading() {
        let clock = ManualClock::new();
        let view = clock.clone();
        assert_eq!(view.now(), Duration::ZERO);

        clock.advance(Duration::from_millis(250));
        clock.advance(Duration::from_millis(250));
        assert_eq!(view.now(), Duration::from_millis(500));
    }

    #[test]
    fn manual_clock_set_never_rewinds() {
        let clock = ManualClock::new();
        clock.set(Duration::from_secs(10));
        clock.set(Duration::from_secs(3));
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn monotonic_clock_follows_paused_tokio_time() {
        let clock = MonotonicClock::default();
        tokio::time::advance(Duration::from_secs(42)).await;
        assert!(clock.now() >= Duration::from_secs(42));
    }
}
