//! Admission gates.
//!
//! A gate decides, per call attempt, whether the attempt may start now or how long the
//! caller must wait first. Two policies are provided:
//!
//! - [`RateGate`]: at most `capacity` admissions in any rolling `window`. Bursts up to
//!   capacity pass immediately, then callers wait for the oldest admission to age out.
//! - [`SpacingGate`]: at least `interval` between consecutive admissions. Calls are
//!   spread evenly and bursts are never allowed.
//!
//! Both record an admission only when they return a zero wait. A positive wait is
//! advisory: after sleeping, the caller must call `admit()` again, because other callers
//! may have taken the freed capacity in the meantime. [`acquire`] implements that loop.
//!
//! Invariants:
//! - The prune/check/record transition runs inside one mutex critical section and the
//!   clock is read inside it, so the log stays sorted and concurrent callers can never
//!   overshoot capacity together.
//! - Nothing but `admit()` mutates a gate.

use crate::clock::{Clock, MonotonicClock};
use crate::error::ConfigError;
use crate::sleeper::Sleeper;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// An admission policy shared by every invoker drawing from one provider quota.
pub trait Admission: Send + Sync + fmt::Debug {
    /// Zero means admitted (and recorded). Positive means wait that long, then ask again.
    fn admit(&self) -> Duration;
}

/// Sliding-window gate: at most `capacity` admissions per rolling `window`.
pub struct RateGate {
    capacity: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    call_log: Mutex<VecDeque<Duration>>,
    admitted: AtomicU64,
}

impl RateGate {
    /// Gate driven by the process-wide monotonic clock.
    pub fn new(capacity: usize, window: Duration) -> Result<Self, ConfigError> {
        Self::with_clock(capacity, window, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(
        capacity: usize,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            capacity,
            window,
            clock,
            call_log: Mutex::new(VecDeque::with_capacity(capacity)),
            admitted: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admissions still inside the trailing window right now. Does not prune.
    pub fn in_window(&self) -> usize {
        let log = self.call_log.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        log.iter().filter(|&&t| now.saturating_sub(t) < self.window).count()
    }

    /// Every admission granted over the gate's lifetime.
    pub fn total_admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }
}

impl Admission for RateGate {
    fn admit(&self) -> Duration {
        let mut log = self.call_log.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        while let Some(&oldest) = log.front() {
            if now.saturating_sub(oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() < self.capacity {
            log.push_back(now);
            self.admitted.fetch_add(1, Ordering::Relaxed);
            return Duration::ZERO;
        }

        // Full log: the oldest entry is younger than `window`, so the wait is positive.
        let oldest = log.front().copied().unwrap_or(now);
        self.window - now.saturating_sub(oldest)
    }
}

impl fmt::Debug for RateGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateGate")
            .field("capacity", &self.capacity)
            .field("window", &self.window)
            .field("total_admitted", &self.total_admitted())
            .finish_non_exhaustive()
    }
}

/// Fixed-spacing gate: consecutive admissions are at least `interval` apart.
pub struct SpacingGate {
    interval: Duration,
    clock: Arc<dyn Clock>,
    last: Mutex<Option<Duration>>,
    admitted: AtomicU64,
}

impl SpacingGate {
    pub fn new(interval: Duration) -> Result<Self, ConfigError> {
        Self::with_clock(interval, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(interval: Duration, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(Self { interval, clock, last: Mutex::new(None), admitted: AtomicU64::new(0) })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn total_admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }
}

impl Admission for SpacingGate {
    fn admit(&self) -> Duration {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        if let Some(previous) = *last {
            let since = now.saturating_sub(previous);
            if since < self.interval {
                return self.interval - since;
            }
        }
        *last = Some(now);
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Duration::ZERO
    }
}

impl fmt::Debug for SpacingGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpacingGate")
            .field("interval", &self.interval)
            .field("total_admitted", &self.total_admitted())
            .finish_non_exhaustive()
    }
}

/// A bounded admission wait that would have been exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("admission needs {required:?} more after waiting {waited:?} (limit: {limit:?})")]
pub struct WaitExceeded {
    pub required: Duration,
    pub waited: Duration,
    pub limit: Duration,
}

/// Admit, sleeping and re-admitting until the gate says zero.
///
/// Returns the total time spent waiting. With `max_wait` set, gives up before a sleep that
/// would push the cumulative wait past the limit; nothing is recorded in that case.
pub async fn acquire<G>(
    gate: &G,
    sleeper: &dyn Sleeper,
    max_wait: Option<Duration>,
) -> Result<Duration, WaitExceeded>
where
    G: Admission + ?Sized,
{
    let mut waited = Duration::ZERO;
    loop {
        let wait = gate.admit();
        if wait.is_zero() {
            return Ok(waited);
        }
        if let Some(limit) = max_wait {
            if waited.saturating_add(wait) > limit {
                return Err(WaitExceeded { required: wait, waited, limit });
            }
        }
        tracing::debug!(?wait, ?waited, "admission throttled");
        sleeper.sleep(wait).await;
        waited += wait;
    }
}
