//! Guarded invocation: admission, per-attempt timeout, bounded retry.
//!
//! Semantics of [`GuardedInvoker::invoke`]:
//! - Attempts are indexed from 0; at most `max_retries + 1` run.
//! - Every attempt is admitted by the gate first, retries included, so the quota is
//!   charged exactly once per attempt and never ahead of time.
//! - An attempt that overruns `timeout` fails with [`AttemptError::Timeout`] and is
//!   classified like any other error.
//! - `is_retryable` alone decides retry eligibility. A non-retryable error ends the
//!   invocation at once; a retryable one sleeps `backoff.delay(attempt)` and then goes
//!   back to the gate. Backoff and quota waits add up; they never overlap.
//!
//! ```text
//! PENDING -> ADMITTED -> ATTEMPTING -> SUCCEEDED
//!    ^                        |-> TERMINAL_FAILURE
//!    '---- BACKOFF <----------'-> RETRYABLE_FAILURE
//! ```
//!
//! Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use medgate::{call_fn, classify, Backoff, CallOutcome, GuardedInvoker, RateGate};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let gate = Arc::new(RateGate::new(15, Duration::from_secs(60)).unwrap());
//! let invoker = GuardedInvoker::builder(gate)
//!     .max_retries(2)
//!     .backoff(Backoff::exponential(Duration::from_millis(10)))
//!     .timeout(Duration::from_secs(30))
//!     .build()
//!     .unwrap();
//!
//! let call = call_fn(|| async { Ok::<_, std::io::Error>("Type 2 diabetes is ...".to_string()) });
//! match invoker.invoke(&call, classify::always).await {
//!     CallOutcome::Success { payload, attempts } => assert_eq!(attempts, 1),
//!     CallOutcome::Failure(failure) => panic!("{}", failure),
//! }
//! # });
//! ```

use crate::backoff::Backoff;
use crate::call::ModelCall;
use crate::error::{AttemptError, CallFailure, ConfigError, FailureKind};
use crate::gate::{acquire, Admission};
use crate::jitter::Jitter;
use crate::outcome::CallOutcome;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{
    emit_best_effort, GateEvent, PolicyEvent, RequestOutcome, RetryEvent, TimeoutEvent,
};
use crate::timeout::TimeoutPolicy;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tower::util::BoxCloneService;
use tower::{BoxError, Service, ServiceExt};

/// Retries used when the builder is not told otherwise.
pub const DEFAULT_MAX_RETRIES: usize = 2;

type SharedSink = Arc<Mutex<BoxCloneService<PolicyEvent, (), BoxError>>>;

/// Runs model calls through a shared admission gate with timeout and retry.
///
/// Cheap to clone; clones share the gate, sleeper and sink.
#[derive(Clone)]
pub struct GuardedInvoker {
    gate: Arc<dyn Admission>,
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    timeout: TimeoutPolicy,
    max_admission_wait: Option<Duration>,
    sleeper: Arc<dyn Sleeper>,
    sink: Option<SharedSink>,
}

impl fmt::Debug for GuardedInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedInvoker")
            .field("gate", &self.gate)
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("timeout", &self.timeout.duration())
            .field("max_admission_wait", &self.max_admission_wait)
            .field("sleeper", &self.sleeper)
            .field("sink", &self.sink.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

impl GuardedInvoker {
    /// Start building an invoker that draws from `gate`.
    pub fn builder<G>(gate: Arc<G>) -> GuardedInvokerBuilder
    where
        G: Admission + 'static,
    {
        GuardedInvokerBuilder::new(gate)
    }

    pub fn gate(&self) -> &Arc<dyn Admission> {
        &self.gate
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.duration()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Run `call` until it succeeds, fails permanently, or runs out of attempts.
    pub async fn invoke<C, P>(&self, call: &C, is_retryable: P) -> CallOutcome<C::Output, C::Error>
    where
        C: ModelCall + ?Sized,
        P: Fn(&AttemptError<C::Error>) -> bool,
    {
        let started = Instant::now();
        let max_attempts = self.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            let admitted =
                acquire(self.gate.as_ref(), self.sleeper.as_ref(), self.max_admission_wait).await;
            match admitted {
                Ok(waited) if !waited.is_zero() => {
                    self.emit(PolicyEvent::Gate(GateEvent::Throttled { attempt, waited })).await;
                }
                Ok(_) => {}
                Err(exceeded) => {
                    self.emit(PolicyEvent::Gate(GateEvent::WaitExceeded {
                        required: exceeded.required,
                        limit: exceeded.limit,
                    }))
                    .await;
                    let failure =
                        CallFailure::quota_wait(exceeded.required, exceeded.limit, attempt);
                    return self.fail(failure, started).await;
                }
            }

            let attempts_made = attempt + 1;
            let error = match self.timeout.run(call.attempt()).await {
                Ok(payload) => {
                    self.emit(PolicyEvent::Request(RequestOutcome::Success {
                        duration: started.elapsed(),
                        attempts: attempts_made,
                    }))
                    .await;
                    return CallOutcome::Success { payload, attempts: attempts_made };
                }
                Err(error) => error,
            };

            if let AttemptError::Timeout { limit, .. } = &error {
                self.emit(PolicyEvent::Timeout(TimeoutEvent::Occurred { timeout: *limit })).await;
            }

            if !is_retryable(&error) {
                let kind =
                    if error.is_timeout() { FailureKind::Timeout } else { FailureKind::Permanent };
                let failure = CallFailure::from_attempt(kind, error, attempts_made);
                return self.fail(failure, started).await;
            }

            if attempts_made >= max_attempts {
                self.emit(PolicyEvent::Retry(RetryEvent::Exhausted {
                    total_attempts: attempts_made,
                    total_duration: started.elapsed(),
                }))
                .await;
                let failure =
                    CallFailure::from_attempt(FailureKind::RetriesExhausted, error, attempts_made);
                return self.fail(failure, started).await;
            }

            let delay = self.jitter.apply(self.backoff.delay(attempt));
            tracing::debug!(
                attempt = attempts_made,
                ?delay,
                error = %error,
                "retrying after transient failure"
            );
            self.emit(PolicyEvent::Retry(RetryEvent::Attempt { attempt: attempts_made + 1, delay }))
                .await;
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }

    async fn fail<T, E>(&self, failure: CallFailure<E>, started: Instant) -> CallOutcome<T, E> {
        tracing::warn!(
            kind = %failure.kind,
            attempts = failure.attempts_made,
            message = %failure.message,
            "guarded call failed"
        );
        self.emit(PolicyEvent::Request(RequestOutcome::Failure {
            duration: started.elapsed(),
            attempts: failure.attempts_made,
        }))
        .await;
        CallOutcome::Failure(failure)
    }

    async fn emit(&self, event: PolicyEvent) {
        let Some(sink) = &self.sink else { return };
        let sink = sink.lock().unwrap_or_else(PoisonError::into_inner).clone();
        emit_best_effort(sink, event).await;
    }
}

/// Builder for [`GuardedInvoker`]. A timeout is mandatory.
pub struct GuardedInvokerBuilder {
    gate: Arc<dyn Admission>,
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    timeout: Option<Duration>,
    max_admission_wait: Option<Duration>,
    sleeper: Arc<dyn Sleeper>,
    sink: Option<SharedSink>,
}

impl GuardedInvokerBuilder {
    pub fn new<G>(gate: Arc<G>) -> Self
    where
        G: Admission + 'static,
    {
        Self {
            gate,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            jitter: Jitter::None,
            timeout: None,
            max_admission_wait: None,
            sleeper: Arc::new(TokioSleeper),
            sink: None,
        }
    }

    /// Retries after the first attempt. `0` disables retrying.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Deadline for a single attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fail with `QuotaWaitExceeded` instead of waiting longer than `limit` for admission.
    pub fn max_admission_wait(mut self, limit: Duration) -> Self {
        self.max_admission_wait = Some(limit);
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Send [`PolicyEvent`]s to `sink`.
    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: Service<PolicyEvent, Response = ()> + Clone + Send + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        let boxed = BoxCloneService::new(sink.map_err(Into::<BoxError>::into));
        self.sink = Some(Arc::new(Mutex::new(boxed)));
        self
    }

    pub fn build(self) -> Result<GuardedInvoker, ConfigError> {
        let timeout = TimeoutPolicy::new(self.timeout.ok_or(ConfigError::MissingTimeout)?)?;
        Ok(GuardedInvoker {
            gate: self.gate,
            max_retries: self.max_retries,
            backoff: self.backoff,
            jitter: self.jitter,
            timeout,
            max_admission_wait: self.max_admission_wait,
            sleeper: self.sleeper,
            sink: self.sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::call_fn;
    use crate::classify;
    use crate::clock::ManualClock;
    use crate::gate::RateGate;
    use crate::sleeper::TrackingSleeper;
    use crate::telemetry::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("TestError: {0}")]
    struct TestError(String);

    fn manual_gate(capacity: usize, window: Duration) -> (Arc<RateGate>, ManualClock) {
        let clock = ManualClock::new();
        let gate = RateGate::with_clock(capacity, window, Arc::new(clock.clone())).expect("gate");
        (Arc::new(gate), clock)
    }

    #[test]
    fn builder_requires_timeout() {
        let (gate, _) = manual_gate(1, Duration::from_secs(1));
        let err = GuardedInvoker::builder(gate.clone()).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingTimeout);

        let err = GuardedInvoker::builder(gate).timeout(Duration::ZERO).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidTimeout(Duration::ZERO));
    }

    #[test]
    fn builder_defaults() {
        let (gate, _) = manual_gate(1, Duration::from_secs(1));
        let invoker =
            GuardedInvoker::builder(gate).timeout(Duration::from_secs(30)).build().expect("built");
        assert_eq!(invoker.max_retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(invoker.timeout(), Duration::from_secs(30));
        assert_eq!(invoker.backoff().delay(0), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn success_on_first_attempt_consumes_one_admission() {
        let (gate, clock) = manual_gate(5, Duration::from_secs(60));
        let invoker = GuardedInvoker::builder(gate.clone())
            .timeout(Duration::from_secs(5))
            .with_sleeper(TrackingSleeper::advancing(clock))
            .build()
            .unwrap();

        let call = call_fn(|| async { Ok::<_, TestError>(42) });
        let outcome = invoker.invoke(&call, classify::always).await;

        assert_eq!(outcome.payload(), Some(&42));
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(gate.total_admitted(), 1);
    }

    #[tokio::test]
    async fn retries_use_backoff_before_readmission() {
        let (gate, clock) = manual_gate(10, Duration::from_secs(60));
        let sleeper = TrackingSleeper::advancing(clock);
        let invoker = GuardedInvoker::builder(gate.clone())
            .max_retries(3)
            .backoff(Backoff::linear(Duration::from_millis(100)))
            .timeout(Duration::from_secs(5))
            .with_sleeper(sleeper.clone())
            .build()
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let attempts = counter.clone();
        let call = call_fn(move || {
            let attempts = attempts.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError(format!("attempt {}", n)))
                } else {
                    Ok("answer")
                }
            }
        });

        let outcome = invoker.invoke(&call, classify::always).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(sleeper.calls(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
        assert_eq!(gate.total_admitted(), 3);
    }

    #[tokio::test]
    async fn zero_retries_exhausts_after_one_attempt() {
        let (gate, clock) = manual_gate(10, Duration::from_secs(60));
        let invoker = GuardedInvoker::builder(gate)
            .max_retries(0)
            .timeout(Duration::from_secs(5))
            .with_sleeper(TrackingSleeper::advancing(clock))
            .build()
            .unwrap();

        let call = call_fn(|| async { Err::<(), _>(TestError("503".into())) });
        let outcome = invoker.invoke(&call, classify::always).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::RetriesExhausted));
        assert_eq!(outcome.attempts(), 1);
    }

    #[tokio::test]
    async fn quota_wait_bound_fails_without_running_the_call() {
        let (gate, clock) = manual_gate(1, Duration::from_secs(60));
        let sink = MemorySink::new();
        let invoker = GuardedInvoker::builder(gate.clone())
            .timeout(Duration::from_secs(5))
            .max_admission_wait(Duration::from_secs(10))
            .with_sleeper(TrackingSleeper::advancing(clock))
            .with_sink(sink.clone())
            .build()
            .unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let call = call_fn(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            }
        });

        assert!(invoker.invoke(&call, classify::always).await.is_success());
        let outcome = invoker.invoke(&call, classify::always).await;

        match outcome {
            CallOutcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::QuotaWaitExceeded);
                assert_eq!(failure.attempts_made, 0);
                assert!(failure.last_error.is_none());
            }
            other => panic!("expected quota failure, got {:?}", other),
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(gate.total_admitted(), 1);
        assert!(sink.events().contains(&PolicyEvent::Gate(GateEvent::WaitExceeded {
            required: Duration::from_secs(60),
            limit: Duration::from_secs(10),
        })));
    }

    #[tokio::test]
    async fn sink_sees_throttle_retry_and_outcome() {
        let (gate, clock) = manual_gate(1, Duration::from_secs(60));
        let sink = MemorySink::new();
        let invoker = GuardedInvoker::builder(gate)
            .max_retries(1)
            .backoff(Backoff::constant(Duration::from_secs(1)))
            .timeout(Duration::from_secs(5))
            .with_sleeper(TrackingSleeper::advancing(clock))
            .with_sink(sink.clone())
            .build()
            .unwrap();

        let call = call_fn(|| async { Err::<(), _>(TestError("overloaded".into())) });
        let outcome = invoker.invoke(&call, classify::always).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::RetriesExhausted));

        let events = sink.events();
        assert_eq!(
            events[0],
            PolicyEvent::Retry(RetryEvent::Attempt { attempt: 2, delay: Duration::from_secs(1) })
        );
        // Backoff took 1s of the 60s window; the second admission waited the rest.
        assert_eq!(
            events[1],
            PolicyEvent::Gate(GateEvent::Throttled { attempt: 1, waited: Duration::from_secs(59) })
        );
        assert!(matches!(
            events[2],
            PolicyEvent::Retry(RetryEvent::Exhausted { total_attempts: 2, .. })
        ));
        assert!(matches!(
            events[3],
            PolicyEvent::Request(RequestOutcome::Failure { attempts: 2, .. })
        ));
    }
}
