#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # medgate
//!
//! Admission control for multi-agent LLM assistants. Every agent's model call passes
//! through one shared quota, a per-attempt deadline, and a bounded retry policy.
//!
//! ## Features
//!
//! - **Sliding-window rate gate**: at most `capacity` admissions per rolling `window`,
//!   safe under concurrent callers
//! - **Spacing gate** for providers that want evenly spaced requests
//! - **Guarded invocation** with per-attempt timeout, caller-classified retry and backoff
//! - **Telemetry** as `tower::Service` sinks, plus `tracing` logs
//! - **Tower layer** for guarding any cloneable service
//!
//! ## Quick Start
//!
//! ```rust
//! use medgate::{call_fn, classify, GuardedInvoker, RateGate};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let gate = Arc::new(RateGate::new(15, Duration::from_secs(60)).unwrap());
//!     let invoker = GuardedInvoker::builder(gate)
//!         .max_retries(2)
//!         .timeout(Duration::from_secs(30))
//!         .build()
//!         .unwrap();
//!
//!     let call = call_fn(|| async { Ok::<_, std::io::Error>("routed to disease_info") });
//!     let outcome = invoker.invoke(&call, classify::always).await;
//!     assert!(outcome.is_success());
//! }
//! ```

pub mod backoff;
pub mod call;
pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod invoker;
pub mod jitter;
pub mod layer;
pub mod prelude;
pub mod presets;
pub mod provider;
pub mod sleeper;
pub mod telemetry;
pub mod timeout;
pub mod turn;

mod outcome;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use call::{call_fn, FnCall, ModelCall};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{BackoffConfig, GateConfig, InvokerConfig, SpacingConfig};
pub use error::{AttemptError, CallFailure, ConfigError, FailureKind};
pub use gate::{acquire, Admission, RateGate, SpacingGate, WaitExceeded};
pub use invoker::{GuardedInvoker, GuardedInvokerBuilder};
pub use jitter::Jitter;
pub use layer::{GuardedLayer, GuardedService};
pub use outcome::CallOutcome;
pub use provider::{CompletionProvider, GuardedProvider, PromptCall, ProviderError};
pub use sleeper::{Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::{TimeoutPolicy, MAX_TIMEOUT};
pub use turn::{StepReport, StepStatus, Turn, TurnReport};
