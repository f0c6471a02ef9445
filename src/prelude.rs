//! Convenient re-exports for common medgate types.
pub use crate::{
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    call::{call_fn, ModelCall},
    classify,
    error::{AttemptError, CallFailure, ConfigError, FailureKind},
    gate::{Admission, RateGate, SpacingGate},
    invoker::GuardedInvoker,
    jitter::Jitter,
    layer::GuardedLayer,
    provider::{CompletionProvider, GuardedProvider, ProviderError},
    telemetry::{MemorySink, PolicyEvent},
    timeout::{TimeoutPolicy, MAX_TIMEOUT},
    CallOutcome,
};
