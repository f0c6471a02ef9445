//! Telemetry for guarded invocations.
//!
//! The invoker emits a [`PolicyEvent`] whenever an admission had to wait, an attempt
//! timed out, a retry was scheduled, or an invocation finished. Events flow into any
//! `tower::Service<PolicyEvent>`, so sinks compose with ordinary tower middleware.
//! Emission is best-effort and never fails an invocation.

pub mod events;
pub mod sinks;

pub use events::{GateEvent, PolicyEvent, RequestOutcome, RetryEvent, TimeoutEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink};
