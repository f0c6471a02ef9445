use std::fmt;
use std::time::Duration;

/// Events emitted while guarding an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    Gate(GateEvent),
    Retry(RetryEvent),
    Timeout(TimeoutEvent),
    Request(RequestOutcome),
}

/// Admission gate events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// An attempt was admitted only after waiting for quota.
    Throttled {
        /// 0-based attempt index within the invocation
        attempt: usize,
        /// Total time spent waiting for this admission
        waited: Duration,
    },
    /// A bounded admission wait would have been exceeded; the attempt never ran.
    WaitExceeded { required: Duration, limit: Duration },
}

/// Retry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    /// A retryable failure was seen; the next attempt follows after `delay`.
    Attempt {
        /// 1-based number of the attempt that will run next
        attempt: usize,
        delay: Duration,
    },
    /// Every permitted attempt failed with a retryable error.
    Exhausted { total_attempts: usize, total_duration: Duration },
}

/// Timeout events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    /// An attempt exceeded its deadline and was cancelled.
    Occurred { timeout: Duration },
}

/// Final outcome of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success { duration: Duration, attempts: usize },
    Failure { duration: Duration, attempts: usize },
}

impl fmt::Display for PolicyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEvent::Gate(event) => write!(f, "Gate::{}", event),
            PolicyEvent::Retry(event) => write!(f, "Retry::{}", event),
            PolicyEvent::Timeout(event) => write!(f, "Timeout::{}", event),
            PolicyEvent::Request(event) => write!(f, "Request::{}", event),
        }
    }
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateEvent::Throttled { attempt, waited } => {
                write!(f, "Throttled(attempt={}, waited={:?})", attempt, waited)
            }
            GateEvent::WaitExceeded { required, limit } => {
                write!(f, "WaitExceeded(required={:?}, limit={:?})", required, limit)
            }
        }
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::Attempt { attempt, delay } => {
                write!(f, "Attempt(#{}, delay={:?})", attempt, delay)
            }
            RetryEvent::Exhausted { total_attempts, total_duration } => {
                write!(f, "Exhausted(attempts={}, duration={:?})", total_attempts, total_duration)
            }
        }
    }
}

impl fmt::Display for TimeoutEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutEvent::Occurred { timeout } => write!(f, "Occurred(timeout={:?})", timeout),
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOutcome::Success { duration, attempts } => {
                write!(f, "Success(attempts={}, duration={:?})", attempts, duration)
            }
            RequestOutcome::Failure { duration, attempts } => {
                write!(f, "Failure(attempts={}, duration={:?})", attempts, duration)
            }
        }
    }
}
