//! Ready-made gates and invokers for a typical hosted completion provider.
//!
//! ```rust
//! use std::sync::Arc;
//! use medgate::presets;
//!
//! let gate = Arc::new(presets::provider_gate());
//! let classifier = presets::agent_invoker(gate.clone());
//! let synthesizer = presets::agent_invoker(gate);
//! assert_eq!(classifier.max_retries(), synthesizer.max_retries());
//! ```

use crate::backoff::Backoff;
use crate::gate::{Admission, RateGate, SpacingGate};
use crate::invoker::GuardedInvoker;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER_CAPACITY: usize = 15;
const PROVIDER_WINDOW_SECS: u64 = 60;
const SPACING_SECS: u64 = 4;

const AGENT_RETRIES: usize = 2;
const AGENT_BACKOFF_BASE_SECS: u64 = 1;
const AGENT_BACKOFF_MAX_SECS: u64 = 8;
const AGENT_TIMEOUT_SECS: u64 = 30;

/// 15 admissions per rolling minute.
pub fn provider_gate() -> RateGate {
    RateGate::new(PROVIDER_CAPACITY, Duration::from_secs(PROVIDER_WINDOW_SECS))
        .expect("valid gate config")
}

/// One admission every 4 seconds, the evenly spaced form of 15 per minute.
pub fn spacing_gate() -> SpacingGate {
    SpacingGate::new(Duration::from_secs(SPACING_SECS)).expect("valid spacing config")
}

/// Invoker for one agent: 2 retries, exponential backoff from 1s capped at 8s, 30s per attempt.
pub fn agent_invoker<G>(gate: Arc<G>) -> GuardedInvoker
where
    G: Admission + 'static,
{
    let backoff = Backoff::exponential(Duration::from_secs(AGENT_BACKOFF_BASE_SECS))
        .with_max(Duration::from_secs(AGENT_BACKOFF_MAX_SECS))
        .expect("valid backoff config");
    GuardedInvoker::builder(gate)
        .max_retries(AGENT_RETRIES)
        .backoff(backoff)
        .timeout(Duration::from_secs(AGENT_TIMEOUT_SECS))
        .build()
        .expect("valid invoker config")
}
