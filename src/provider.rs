//! The completion provider an assistant's agents talk to, and its guarded wrapper.

use crate::call::ModelCall;
use crate::classify;
use crate::invoker::GuardedInvoker;
use crate::outcome::CallOutcome;
use crate::turn::Turn;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Errors a completion provider may report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("authentication failed")]
    Unauthorized,
}

impl ProviderError {
    /// Whether a fresh attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited | ProviderError::Unavailable(_) => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::InvalidRequest(_) | ProviderError::Unauthorized => false,
        }
    }
}

/// An opaque text-completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

#[async_trait]
impl<P: CompletionProvider + ?Sized> CompletionProvider for Arc<P> {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        (**self).complete(prompt).await
    }
}

/// A provider whose every call goes through a [`GuardedInvoker`].
///
/// Agents sharing one provider quota should share one gate: build one invoker per agent
/// (or clone one) from the same `Arc` gate.
pub struct GuardedProvider<P: ?Sized> {
    invoker: GuardedInvoker,
    provider: Arc<P>,
}

impl<P: ?Sized> Clone for GuardedProvider<P> {
    fn clone(&self) -> Self {
        Self { invoker: self.invoker.clone(), provider: self.provider.clone() }
    }
}

impl<P: ?Sized> fmt::Debug for GuardedProvider<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedProvider").field("invoker", &self.invoker).finish_non_exhaustive()
    }
}

impl<P: CompletionProvider + ?Sized> GuardedProvider<P> {
    pub fn new(provider: Arc<P>, invoker: GuardedInvoker) -> Self {
        Self { invoker, provider }
    }

    pub fn invoker(&self) -> &GuardedInvoker {
        &self.invoker
    }

    /// Complete `prompt`, retrying timeouts and transient provider errors.
    pub async fn complete(&self, prompt: &str) -> CallOutcome<String, ProviderError> {
        let call = PromptCall::new(self.provider.as_ref(), prompt);
        self.invoker.invoke(&call, classify::transient(ProviderError::is_transient)).await
    }

    /// Start a turn: a sequence of completions made one at a time.
    pub fn turn(&self) -> Turn<'_, P> {
        Turn::new(self)
    }
}

/// One completion request against a borrowed provider.
pub struct PromptCall<'a, P: ?Sized> {
    provider: &'a P,
    prompt: &'a str,
}

impl<'a, P: ?Sized> PromptCall<'a, P> {
    pub fn new(provider: &'a P, prompt: &'a str) -> Self {
        Self { provider, prompt }
    }
}

#[async_trait]
impl<'a, P: CompletionProvider + ?Sized> ModelCall for PromptCall<'a, P> {
    type Output = String;
    type Error = ProviderError;

    async fn attempt(&self) -> Result<String, ProviderError> {
        self.provider.complete(self.prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::FailureKind;
    use crate::gate::RateGate;
    use crate::sleeper::TrackingSleeper;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), prompts: Mutex::default() })
        }
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies.lock().unwrap().pop_front().unwrap_or(Ok(String::new()))
        }
    }

    fn guarded(provider: Arc<Scripted>) -> GuardedProvider<Scripted> {
        let clock = ManualClock::new();
        let gate = Arc::new(
            RateGate::with_clock(15, Duration::from_secs(60), Arc::new(clock.clone())).unwrap(),
        );
        let invoker = GuardedInvoker::builder(gate)
            .timeout(Duration::from_secs(30))
            .with_sleeper(TrackingSleeper::advancing(clock))
            .build()
            .unwrap();
        GuardedProvider::new(provider, invoker)
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::Unavailable("maintenance".into()).is_transient());
        assert!(ProviderError::Status { status: 503, message: String::new() }.is_transient());
        assert!(ProviderError::Status { status: 429, message: String::new() }.is_transient());
        assert!(!ProviderError::Status { status: 404, message: String::new() }.is_transient());
        assert!(!ProviderError::Unauthorized.is_transient());
    }

    #[tokio::test]
    async fn retries_rate_limited_completions() {
        let provider = Scripted::new(vec![Err(ProviderError::RateLimited), Ok("flu".into())]);
        let guarded = guarded(provider.clone());
        assert_eq!(guarded.invoker().max_retries(), 2);
        let outcome = guarded.complete("classify: fever and cough").await;

        assert_eq!(outcome.payload().map(String::as_str), Some("flu"));
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(provider.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unauthorized_is_permanent() {
        let provider = Scripted::new(vec![Err(ProviderError::Unauthorized)]);
        let outcome = guarded(provider).complete("hello").await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Permanent));
        assert_eq!(outcome.attempts(), 1);
    }
}
