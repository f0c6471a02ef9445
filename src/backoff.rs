//! Backoff strategies for retried attempts.
//!
//! `delay(retry)` is indexed by the failed attempt: `retry = 0` is the pause after the
//! first failure, before the second attempt is admitted. Strategies:
//!
//! - constant: the same delay every time
//! - linear: `base * (retry + 1)`
//! - exponential: `base * 2^retry`, optionally capped with [`Backoff::with_max`]
//! - schedule: an explicit list; the last entry repeats once the list runs out
//! - custom: any `Fn(usize) -> Duration`
//!
//! ```rust
//! use std::time::Duration;
//! use medgate::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100))
//!     .with_max(Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::from_millis(100));
//! assert_eq!(backoff.delay(1), Duration::from_millis(200));
//! assert_eq!(backoff.delay(9), Duration::from_secs(1)); // capped
//! ```
//!
//! Overflow behavior: every computation saturates at [`MAX_BACKOFF`] (1 day).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on any computed delay (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("with_max is only valid for linear or exponential backoff")]
    MaxNotSupported,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
    #[error("a backoff schedule needs at least one delay")]
    EmptySchedule,
}

#[derive(Clone)]
enum BackoffKind {
    Constant(Duration),
    Linear { base: Duration, max: Option<Duration> },
    Exponential { base: Duration, max: Option<Duration> },
    Schedule(Arc<[Duration]>),
    Custom(Arc<dyn Fn(usize) -> Duration + Send + Sync>),
}

impl fmt::Debug for BackoffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(d) => f.debug_tuple("Constant").field(d).finish(),
            Self::Linear { base, max } => {
                f.debug_struct("Linear").field("base", base).field("max", max).finish()
            }
            Self::Exponential { base, max } => {
                f.debug_struct("Exponential").field("base", base).field("max", max).finish()
            }
            Self::Schedule(delays) => f.debug_tuple("Schedule").field(delays).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Backoff policy applied between a failed attempt and the next admission.
#[derive(Debug, Clone)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant(delay) }
    }

    pub fn linear(base: Duration) -> Self {
        Self { kind: BackoffKind::Linear { base, max: None } }
    }

    pub fn exponential(base: Duration) -> Self {
        Self { kind: BackoffKind::Exponential { base, max: None } }
    }

    /// Explicit per-retry delays. Retries past the end reuse the last entry.
    pub fn schedule<I>(delays: I) -> Result<Self, BackoffError>
    where
        I: IntoIterator<Item = Duration>,
    {
        let delays: Arc<[Duration]> = delays.into_iter().collect();
        if delays.is_empty() {
            return Err(BackoffError::EmptySchedule);
        }
        Ok(Self { kind: BackoffKind::Schedule(delays) })
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        Self { kind: BackoffKind::Custom(Arc::new(f)) }
    }

    /// Cap linear or exponential growth at `max`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Linear { base, max: cap }
            | BackoffKind::Exponential { base, max: cap } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *cap = Some(max);
                Ok(self)
            }
            _ => Err(BackoffError::MaxNotSupported),
        }
    }

    /// Delay to sleep after the failed attempt with index `retry`.
    pub fn delay(&self, retry: usize) -> Duration {
        let raw = match &self.kind {
            BackoffKind::Constant(delay) => *delay,
            BackoffKind::Linear { base, max } => {
                let factor = u32::try_from(retry.saturating_add(1)).unwrap_or(u32::MAX);
                let linear = base.checked_mul(factor).unwrap_or(MAX_BACKOFF);
                max.map_or(linear, |m| linear.min(m))
            }
            BackoffKind::Exponential { base, max } => {
                let exponent = u32::try_from(retry).unwrap_or(u32::MAX);
                let nanos = base.as_nanos().saturating_mul(2u128.saturating_pow(exponent));
                let exp = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
                max.map_or(exp, |m| exp.min(m))
            }
            BackoffKind::Schedule(delays) => {
                delays.get(retry).or_else(|| delays.last()).copied().unwrap_or_default()
            }
            BackoffKind::Custom(f) => f(retry),
        };
        raw.min(MAX_BACKOFF)
    }
}

impl Default for Backoff {
    /// Exponential from 1s, capped at 30s.
    fn default() -> Self {
        Self {
            kind: BackoffKind::Exponential {
                base: Duration::from_secs(1),
                max: Some(Duration::from_secs(30)),
            },
        }
    }
}
