//! One logical turn of the assistant: classify, route, synthesize.
//!
//! [`Turn::step`] borrows the turn mutably, so a turn never has more than one model call
//! in flight and its steps complete in the order they were issued. A failed step does not
//! abort the turn; it yields the caller's fallback text and is recorded as degraded.

use crate::error::FailureKind;
use crate::outcome::CallOutcome;
use crate::provider::{CompletionProvider, GuardedProvider};
use std::time::Duration;
use tokio::time::Instant;

/// How a single step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    /// The call failed and the fallback text was used instead.
    Degraded { kind: FailureKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub name: String,
    pub attempts: usize,
    pub status: StepStatus,
}

/// Summary of a finished turn, steps in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub steps: Vec<StepReport>,
    pub elapsed: Duration,
}

impl TurnReport {
    pub fn is_degraded(&self) -> bool {
        self.steps.iter().any(|s| matches!(s.status, StepStatus::Degraded { .. }))
    }

    /// Attempts across all steps; equals the quota the turn consumed.
    pub fn total_attempts(&self) -> usize {
        self.steps.iter().map(|s| s.attempts).sum()
    }
}

pub struct Turn<'a, P: ?Sized> {
    provider: &'a GuardedProvider<P>,
    steps: Vec<StepReport>,
    started: Instant,
}

impl<'a, P: CompletionProvider + ?Sized> Turn<'a, P> {
    pub fn new(provider: &'a GuardedProvider<P>) -> Self {
        Self { provider, steps: Vec::new(), started: Instant::now() }
    }

    /// Run one completion; on failure, return `fallback` and record the failure.
    pub async fn step(&mut self, name: &str, prompt: &str, fallback: &str) -> String {
        let outcome = self.provider.complete(prompt).await;
        let attempts = outcome.attempts();
        let (text, status) = match outcome {
            CallOutcome::Success { payload, .. } => (payload, StepStatus::Completed),
            CallOutcome::Failure(failure) => {
                tracing::warn!(step = name, kind = %failure.kind, "step degraded to fallback");
                let status = StepStatus::Degraded { kind: failure.kind, message: failure.message };
                (fallback.to_string(), status)
            }
        };
        tracing::debug!(step = name, attempts, "step finished");
        self.steps.push(StepReport { name: name.to_string(), attempts, status });
        text
    }

    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    pub fn finish(self) -> TurnReport {
        TurnReport { steps: self.steps, elapsed: self.started.elapsed() }
    }
}
