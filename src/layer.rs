//! Tower integration: run every request of a service through a [`GuardedInvoker`].
//!
//! Each attempt is independent. The layer clones the inner service and the request per
//! attempt, waits for the clone to be ready, then calls it, so a retried request is a
//! fresh call that is admitted by the gate on its own.

use crate::call::ModelCall;
use crate::error::{AttemptError, CallFailure};
use crate::invoker::GuardedInvoker;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};
use tower_layer::Layer;

type Classifier<E> = Arc<dyn Fn(&AttemptError<E>) -> bool + Send + Sync>;

/// Layer that guards an inner service whose error type is `E`.
pub struct GuardedLayer<E> {
    invoker: GuardedInvoker,
    is_retryable: Classifier<E>,
}

impl<E> GuardedLayer<E> {
    pub fn new<P>(invoker: GuardedInvoker, is_retryable: P) -> Self
    where
        P: Fn(&AttemptError<E>) -> bool + Send + Sync + 'static,
    {
        Self { invoker, is_retryable: Arc::new(is_retryable) }
    }
}

impl<E> Clone for GuardedLayer<E> {
    fn clone(&self) -> Self {
        Self { invoker: self.invoker.clone(), is_retryable: self.is_retryable.clone() }
    }
}

impl<E> fmt::Debug for GuardedLayer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedLayer").field("invoker", &self.invoker).finish_non_exhaustive()
    }
}

impl<S, E> Layer<S> for GuardedLayer<E> {
    type Service = GuardedService<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardedService { inner, layer: self.clone() }
    }
}

/// Service produced by [`GuardedLayer`].
pub struct GuardedService<S, E> {
    inner: S,
    layer: GuardedLayer<E>,
}

impl<S: Clone, E> Clone for GuardedService<S, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), layer: self.layer.clone() }
    }
}

impl<S: fmt::Debug, E> fmt::Debug for GuardedService<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedService")
            .field("inner", &self.inner)
            .field("layer", &self.layer)
            .finish()
    }
}

impl<S, E, Request> Service<Request> for GuardedService<S, E>
where
    Request: Clone + Send + 'static,
    S: Service<Request, Error = E> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = CallFailure<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    // Readiness is checked per attempt, after admission.
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let invoker = self.layer.invoker.clone();
        let is_retryable = self.layer.is_retryable.clone();
        let attempt =
            ServiceAttempt { inner: Mutex::new(self.inner.clone()), request: Mutex::new(request) };
        Box::pin(async move { invoker.invoke(&attempt, |e| is_retryable(e)).await.into_result() })
    }
}

struct ServiceAttempt<S, Request> {
    inner: Mutex<S>,
    request: Mutex<Request>,
}

#[async_trait]
impl<S, Request> ModelCall for ServiceAttempt<S, Request>
where
    Request: Clone + Send + 'static,
    S: Service<Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    type Output = S::Response;
    type Error = S::Error;

    async fn attempt(&self) -> Result<S::Response, S::Error> {
        let service = self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let request = self.request.lock().unwrap_or_else(PoisonError::into_inner).clone();
        service.oneshot(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;
    use crate::clock::ManualClock;
    use crate::error::FailureKind;
    use crate::gate::RateGate;
    use crate::sleeper::TrackingSleeper;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::service_fn;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("status {0}")]
    struct Status(u16);

    fn invoker(max_retries: usize) -> (GuardedInvoker, Arc<RateGate>) {
        let clock = ManualClock::new();
        let gate = Arc::new(
            RateGate::with_clock(10, Duration::from_secs(60), Arc::new(clock.clone())).unwrap(),
        );
        let invoker = GuardedInvoker::builder(gate.clone())
            .max_retries(max_retries)
            .timeout(Duration::from_secs(5))
            .with_sleeper(TrackingSleeper::advancing(clock))
            .build()
            .unwrap();
        (invoker, gate)
    }

    #[tokio::test]
    async fn retries_transient_statuses_through_the_gate() {
        let (invoker, gate) = invoker(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = service_fn(move |prompt: &'static str| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Status(503))
                } else {
                    Ok(format!("answer to {}", prompt))
                }
            }
        });

        let layer = GuardedLayer::new(invoker, classify::transient(|s: &Status| s.0 >= 500));
        let svc = layer.layer(inner);
        let response = svc.oneshot("what is asthma").await.unwrap();

        assert_eq!(response, "answer to what is asthma");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gate.total_admitted(), 2);
    }

    #[tokio::test]
    async fn permanent_status_surfaces_as_call_failure() {
        let (invoker, gate) = invoker(2);
        let inner = service_fn(|_: ()| async { Err::<(), _>(Status(400)) });

        let layer = GuardedLayer::new(invoker, classify::transient(|s: &Status| s.0 >= 500));
        let svc = layer.layer(inner);
        let failure = svc.oneshot(()).await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::Permanent);
        assert_eq!(failure.attempts_made, 1);
        assert_eq!(failure.call_error(), Some(&Status(400)));
        assert_eq!(gate.total_admitted(), 1);
    }
}
