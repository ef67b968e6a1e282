use std::{fmt, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{LivyHttpError, Result};

/// Decides whether a failed attempt is retried and how long to wait first.
///
/// Implementations hold configuration only. The retry count is owned by the
/// caller and passed in on every decision, so one policy can be shared by
/// any number of clients.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// `status` is `None` when the attempt failed at the network layer, in
    /// which case `error_occurred` is `true`.
    fn should_retry(&self, status: Option<u16>, error_occurred: bool, retry_count: u32) -> bool;

    /// Backoff before retry number `retry_count + 1`. Never decreases as
    /// `retry_count` grows.
    fn seconds_to_sleep(&self, retry_count: u32) -> Duration;
}

/// Statuses every bundled policy treats as transient.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

fn default_decision(
    status: Option<u16>,
    error_occurred: bool,
    retry_count: u32,
    max_retries: u32,
) -> bool {
    if retry_count >= max_retries {
        return false;
    }
    error_occurred || status.is_some_and(is_transient_status)
}

/// Sleeps for an explicit, per-retry list of durations.
///
/// Retries past the end of the list reuse its last entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigurableRetryPolicy {
    seconds_to_sleep: Vec<Duration>,
    max_retries: u32,
}

impl ConfigurableRetryPolicy {
    /// Fails when the list decreases anywhere.
    pub fn new(seconds_to_sleep: Vec<Duration>, max_retries: u32) -> Result<Self> {
        if seconds_to_sleep.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(LivyHttpError::Config(
                "retry sleep list must be non-decreasing".to_owned(),
            ));
        }
        Ok(Self {
            seconds_to_sleep,
            max_retries,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for ConfigurableRetryPolicy {
    fn default() -> Self {
        Self {
            seconds_to_sleep: [200, 500, 1_000, 3_000, 5_000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            max_retries: 8,
        }
    }
}

impl RetryPolicy for ConfigurableRetryPolicy {
    fn should_retry(&self, status: Option<u16>, error_occurred: bool, retry_count: u32) -> bool {
        default_decision(status, error_occurred, retry_count, self.max_retries)
    }

    fn seconds_to_sleep(&self, retry_count: u32) -> Duration {
        let index = usize::try_from(retry_count).unwrap_or(usize::MAX);
        self.seconds_to_sleep
            .get(index)
            .or_else(|| self.seconds_to_sleep.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// `base * 2^retry_count`, capped at `max_delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExponentialRetryPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for ExponentialRetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

impl RetryPolicy for ExponentialRetryPolicy {
    fn should_retry(&self, status: Option<u16>, error_occurred: bool, retry_count: u32) -> bool {
        default_decision(status, error_occurred, retry_count, self.max_retries)
    }

    fn seconds_to_sleep(&self, retry_count: u32) -> Duration {
        let exp = retry_count.min(16);
        self.base
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// Same sleep before every retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantRetryPolicy {
    pub delay: Duration,
    pub max_retries: u32,
}

impl ConstantRetryPolicy {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }
}

impl RetryPolicy for ConstantRetryPolicy {
    fn should_retry(&self, status: Option<u16>, error_occurred: bool, retry_count: u32) -> bool {
        default_decision(status, error_occurred, retry_count, self.max_retries)
    }

    fn seconds_to_sleep(&self, _retry_count: u32) -> Duration {
        self.delay
    }
}

/// Serialized form of a retry policy, as found in client configuration.
///
/// ```json
/// { "kind": "configurable", "seconds_to_sleep": [0.2, 0.5, 1, 3, 5], "max_retries": 8 }
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicyConfig {
    Configurable {
        seconds_to_sleep: Vec<f64>,
        max_retries: u32,
    },
    Exponential {
        base_seconds: f64,
        max_delay_seconds: f64,
        max_retries: u32,
    },
    Constant {
        seconds: f64,
        max_retries: u32,
    },
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self::Configurable {
            seconds_to_sleep: vec![0.2, 0.5, 1.0, 3.0, 5.0],
            max_retries: 8,
        }
    }
}

impl RetryPolicyConfig {
    /// Validates the configured numbers and builds the policy.
    pub fn build(&self) -> Result<Arc<dyn RetryPolicy>> {
        match self {
            Self::Configurable {
                seconds_to_sleep,
                max_retries,
            } => {
                let sleeps = seconds_to_sleep
                    .iter()
                    .map(|seconds| seconds_to_duration(*seconds))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(ConfigurableRetryPolicy::new(sleeps, *max_retries)?))
            }
            Self::Exponential {
                base_seconds,
                max_delay_seconds,
                max_retries,
            } => Ok(Arc::new(ExponentialRetryPolicy {
                base: seconds_to_duration(*base_seconds)?,
                max_delay: seconds_to_duration(*max_delay_seconds)?,
                max_retries: *max_retries,
            })),
            Self::Constant {
                seconds,
                max_retries,
            } => Ok(Arc::new(ConstantRetryPolicy::new(
                seconds_to_duration(*seconds)?,
                *max_retries,
            ))),
        }
    }
}

fn seconds_to_duration(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(LivyHttpError::Config(format!(
            "retry sleep must be a finite, non-negative number of seconds, got {seconds}"
        )));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|err| LivyHttpError::Config(format!("retry sleep {seconds}s: {err}")))
}
