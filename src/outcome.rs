//! Uniform result of a guarded invocation.

use crate::error::{CallFailure, FailureKind};

/// Either the payload of a successful attempt or an explicit failure.
///
/// `Failure` is an expected outcome: agents are meant to fall back to a degraded answer
/// rather than abort the surrounding workflow.
#[derive(Debug, Clone)]
pub enum CallOutcome<T, E> {
    Success { payload: T, attempts: usize },
    Failure(CallFailure<E>),
}

impl<T, E> CallOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Attempts executed, successful or not.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Success { attempts, .. } => *attempts,
            Self::Failure(failure) => failure.attempts_made,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure.kind),
        }
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, CallFailure<E>> {
        match self {
            Self::Success { payload, .. } => Ok(payload),
            Self::Failure(failure) => Err(failure),
        }
    }

    /// The payload, or `fallback` built from the failure.
    pub fn unwrap_or_else<F>(self, fallback: F) -> T
    where
        F: FnOnce(CallFailure<E>) -> T,
    {
        match self {
            Self::Success { payload, .. } => payload,
            Self::Failure(failure) => fallback(failure),
        }
    }
}
