//! Per-attempt deadline.

use crate::error::{AttemptError, ConfigError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound accepted for a single attempt (1 day).
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl TimeoutPolicy {
    /// Rejects zero and anything above [`MAX_TIMEOUT`].
    pub fn new(duration: Duration) -> Result<Self, ConfigError> {
        if duration.is_zero() || duration > MAX_TIMEOUT {
            return Err(ConfigError::InvalidTimeout(duration));
        }
        Ok(Self { duration })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Drive `attempt` to completion or cancel it at the deadline.
    pub async fn run<T, E, Fut>(&self, attempt: Fut) -> Result<T, AttemptError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        match tokio::time::timeout(self.duration, attempt).await {
            Ok(result) => result.map_err(AttemptError::Call),
            Err(_) => Err(AttemptError::Timeout { elapsed: start.elapsed(), limit: self.duration }),
        }
    }
}
