//! Plain-data configuration for gates and invokers.
//!
//! With the `serde` feature, every config (de)serializes and durations are written as
//! integer milliseconds:
//!
//! ```json
//! { "capacity": 15, "window_ms": 60000 }
//! ```

use crate::backoff::Backoff;
use crate::error::ConfigError;
use crate::gate::{Admission, RateGate, SpacingGate};
use crate::invoker::{GuardedInvoker, GuardedInvokerBuilder, DEFAULT_MAX_RETRIES};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sliding-window gate settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GateConfig {
    pub capacity: usize,
    #[cfg_attr(feature = "serde", serde(rename = "window_ms", with = "millis"))]
    pub window: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { capacity: 15, window: Duration::from_secs(60) }
    }
}

impl GateConfig {
    pub fn build(&self) -> Result<RateGate, ConfigError> {
        RateGate::new(self.capacity, self.window)
    }
}

/// Fixed-spacing gate settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpacingConfig {
    #[cfg_attr(feature = "serde", serde(rename = "interval_ms", with = "millis"))]
    pub interval: Duration,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(4) }
    }
}

impl SpacingConfig {
    pub fn build(&self) -> Result<SpacingGate, ConfigError> {
        SpacingGate::new(self.interval)
    }
}

/// Serializable form of a [`Backoff`]. Custom strategies have no config form.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum BackoffConfig {
    Constant {
        #[cfg_attr(feature = "serde", serde(rename = "delay_ms", with = "millis"))]
        delay: Duration,
    },
    Linear {
        #[cfg_attr(feature = "serde", serde(rename = "base_ms", with = "millis"))]
        base: Duration,
        #[cfg_attr(
            feature = "serde",
            serde(
                rename = "max_ms",
                default,
                with = "opt_millis",
                skip_serializing_if = "Option::is_none"
            )
        )]
        max: Option<Duration>,
    },
    Exponential {
        #[cfg_attr(feature = "serde", serde(rename = "base_ms", with = "millis"))]
        base: Duration,
        #[cfg_attr(
            feature = "serde",
            serde(
                rename = "max_ms",
                default,
                with = "opt_millis",
                skip_serializing_if = "Option::is_none"
            )
        )]
        max: Option<Duration>,
    },
    Schedule {
        #[cfg_attr(feature = "serde", serde(rename = "delays_ms", with = "vec_millis"))]
        delays: Vec<Duration>,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            base: Duration::from_secs(1),
            max: Some(Duration::from_secs(30)),
        }
    }
}

impl BackoffConfig {
    pub fn build(&self) -> Result<Backoff, ConfigError> {
        let backoff = match self {
            BackoffConfig::Constant { delay } => Backoff::constant(*delay),
            BackoffConfig::Linear { base, max } => cap(Backoff::linear(*base), *max)?,
            BackoffConfig::Exponential { base, max } => cap(Backoff::exponential(*base), *max)?,
            BackoffConfig::Schedule { delays } => Backoff::schedule(delays.iter().copied())?,
        };
        Ok(backoff)
    }
}

fn cap(backoff: Backoff, max: Option<Duration>) -> Result<Backoff, ConfigError> {
    match max {
        Some(max) => Ok(backoff.with_max(max)?),
        None => Ok(backoff),
    }
}

/// Invoker settings. The gate is supplied separately so several invokers can share it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InvokerConfig {
    pub max_retries: usize,
    #[cfg_attr(feature = "serde", serde(rename = "timeout_ms", with = "millis"))]
    pub timeout: Duration,
    pub backoff: BackoffConfig,
    #[cfg_attr(
        feature = "serde",
        serde(
            rename = "max_admission_wait_ms",
            with = "opt_millis",
            skip_serializing_if = "Option::is_none"
        )
    )]
    pub max_admission_wait: Option<Duration>,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
            max_admission_wait: None,
        }
    }
}

impl InvokerConfig {
    /// Builder pre-filled from this config, for adding a sleeper or sink before building.
    pub fn builder<G>(&self, gate: Arc<G>) -> Result<GuardedInvokerBuilder, ConfigError>
    where
        G: Admission + 'static,
    {
        let mut builder = GuardedInvoker::builder(gate)
            .max_retries(self.max_retries)
            .backoff(self.backoff.build()?)
            .timeout(self.timeout);
        if let Some(limit) = self.max_admission_wait {
            builder = builder.max_admission_wait(limit);
        }
        Ok(builder)
    }

    pub fn build<G>(&self, gate: Arc<G>) -> Result<GuardedInvoker, ConfigError>
    where
        G: Admission + 'static,
    {
        self.builder(gate)?.build()
    }
}

#[cfg(feature = "serde")]
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(feature = "serde")]
mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::millis::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(feature = "serde")]
mod vec_millis {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(value.len()))?;
        for d in value {
            seq.serialize_element(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Duration>, D::Error> {
        Ok(Vec::<u64>::deserialize(deserializer)?.into_iter().map(Duration::from_millis).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffError;

    #[test]
    fn defaults_build() {
        let gate = Arc::new(GateConfig::default().build().unwrap());
        assert_eq!(gate.capacity(), 15);
        assert_eq!(gate.window(), Duration::from_secs(60));

        let invoker = InvokerConfig::default().build(gate).unwrap();
        assert_eq!(invoker.max_retries(), 2);
        assert_eq!(invoker.timeout(), Duration::from_secs(30));
        assert_eq!(SpacingConfig::default().build().unwrap().interval(), Duration::from_secs(4));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero = GateConfig { capacity: 0, window: Duration::from_secs(1) };
        assert_eq!(zero.build().unwrap_err(), ConfigError::ZeroCapacity);

        let backoff = BackoffConfig::Exponential {
            base: Duration::from_secs(2),
            max: Some(Duration::from_secs(1)),
        };
        assert!(matches!(
            backoff.build().unwrap_err(),
            ConfigError::Backoff(BackoffError::MaxLessThanBase { .. })
        ));

        let empty = BackoffConfig::Schedule { delays: Vec::new() };
        assert_eq!(empty.build().unwrap_err(), ConfigError::Backoff(BackoffError::EmptySchedule));

        let gate = Arc::new(GateConfig::default().build().unwrap());
        let no_deadline = InvokerConfig { timeout: Duration::ZERO, ..InvokerConfig::default() };
        assert_eq!(
            no_deadline.build(gate).unwrap_err(),
            ConfigError::InvalidTimeout(Duration::ZERO)
        );
    }

    #[test]
    fn schedule_config_builds_schedule_backoff() {
        let config = BackoffConfig::Schedule {
            delays: vec![Duration::from_secs(1), Duration::from_secs(2)],
        };
        let backoff = config.build().unwrap();
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(5), Duration::from_secs(2));
    }
}
