//! The capability an invoker guards: one attempt against an external service.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// Perform one attempt against the backend, yielding a payload or a classifiable error.
///
/// The invoker calls `attempt` once per admitted attempt, so implementations must be
/// re-runnable: a retry is a fresh call, not a resumption.
#[async_trait]
pub trait ModelCall: Send + Sync {
    type Output: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn attempt(&self) -> Result<Self::Output, Self::Error>;
}

/// [`ModelCall`] backed by a closure. Build with [`call_fn`].
#[derive(Clone)]
pub struct FnCall<F> {
    f: F,
}

/// Adapt a closure returning a future into a [`ModelCall`].
///
/// ```rust
/// use medgate::call::{call_fn, ModelCall};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let call = call_fn(|| async { Ok::<_, std::io::Error>("pong") });
/// assert_eq!(call.attempt().await.unwrap(), "pong");
/// # });
/// ```
pub fn call_fn<F>(f: F) -> FnCall<F> {
    FnCall { f }
}

#[async_trait]
impl<F, Fut, T, E> ModelCall for FnCall<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Output = T;
    type Error = E;

    async fn attempt(&self) -> Result<T, E> {
        (self.f)().await
    }
}

impl<F> fmt::Debug for FnCall<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCall").finish_non_exhaustive()
    }
}
