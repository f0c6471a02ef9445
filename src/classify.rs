//! Ready-made `is_retryable` predicates.
//!
//! The invoker never decides on its own whether an error is transient; callers pass a
//! predicate over [`AttemptError`]. These cover the common shapes.

use crate::error::AttemptError;

/// Retry everything, timeouts included.
pub fn always<E>(_: &AttemptError<E>) -> bool {
    true
}

/// Retry nothing.
pub fn never<E>(_: &AttemptError<E>) -> bool {
    false
}

/// Retry timeouts only; every call error is permanent.
pub fn timeouts_only<E>(error: &AttemptError<E>) -> bool {
    error.is_timeout()
}

/// Timeouts are retryable; call errors are retryable when `is_transient` says so.
pub fn transient<E, P>(is_transient: P) -> impl Fn(&AttemptError<E>) -> bool + Send + Sync
where
    P: Fn(&E) -> bool + Send + Sync,
{
    move |error| match error {
        AttemptError::Timeout { .. } => true,
        AttemptError::Call(e) => is_transient(e),
    }
}
