//! Error types for gates and guarded invocations
use crate::backoff::BackoffError;
use std::fmt;
use std::time::Duration;

/// Rejected construction-time configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("gate capacity must be > 0")]
    ZeroCapacity,
    #[error("gate window must be > 0")]
    ZeroWindow,
    #[error("spacing interval must be > 0")]
    ZeroInterval,
    #[error("timeout must be non-zero and finite (got {0:?})")]
    InvalidTimeout(Duration),
    #[error("a per-attempt timeout is required")]
    MissingTimeout,
    #[error(transparent)]
    Backoff(#[from] BackoffError),
}

/// Why a single attempt failed. This is what `is_retryable` predicates classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// The attempt did not finish within the per-attempt deadline.
    Timeout { elapsed: Duration, limit: Duration },
    /// The wrapped call returned an error.
    Call(E),
}

impl<E> AttemptError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Borrow the call error, if this is not a timeout.
    pub fn as_call(&self) -> Option<&E> {
        match self {
            Self::Call(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }

    pub fn into_call(self) -> Option<E> {
        match self {
            Self::Call(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { elapsed, limit } => {
                write!(f, "attempt timed out after {:?} (limit: {:?})", elapsed, limit)
            }
            Self::Call(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AttemptError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Call(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }
}

/// Terminal failure categories of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The admission wait would have exceeded the configured bound.
    QuotaWaitExceeded,
    /// An attempt timed out and the timeout was classified as not retryable.
    Timeout,
    /// The call failed with an error classified as not retryable.
    Permanent,
    /// Every permitted attempt failed with a retryable error.
    RetriesExhausted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::QuotaWaitExceeded => "quota wait exceeded",
            Self::Timeout => "timeout",
            Self::Permanent => "permanent error",
            Self::RetriesExhausted => "retries exhausted",
        };
        f.write_str(label)
    }
}

/// The failure half of a [`CallOutcome`](crate::CallOutcome).
#[derive(Debug, Clone)]
pub struct CallFailure<E> {
    pub kind: FailureKind,
    /// Human-readable description, suitable for logs.
    pub message: String,
    /// Attempts that were actually executed (admitted and run).
    pub attempts_made: usize,
    /// The error of the final attempt. `None` when no attempt ran.
    pub last_error: Option<AttemptError<E>>,
}

impl<E: fmt::Display> CallFailure<E> {
    pub(crate) fn from_attempt(
        kind: FailureKind,
        error: AttemptError<E>,
        attempts_made: usize,
    ) -> Self {
        Self { kind, message: error.to_string(), attempts_made, last_error: Some(error) }
    }
}

impl<E> CallFailure<E> {
    pub(crate) fn quota_wait(required: Duration, limit: Duration, attempts_made: usize) -> Self {
        Self {
            kind: FailureKind::QuotaWaitExceeded,
            message: format!("admission requires {:?} more wait (limit: {:?})", required, limit),
            attempts_made,
            last_error: None,
        }
    }

    /// Borrow the underlying call error, if the last attempt produced one.
    pub fn call_error(&self) -> Option<&E> {
        self.last_error.as_ref().and_then(AttemptError::as_call)
    }
}

impl<E> fmt::Display for CallFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} attempt(s): {}", self.kind, self.attempts_made, self.message)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CallFailure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last_error.as_ref().map(|e| e as &dyn std::error::Error)
    }
}
