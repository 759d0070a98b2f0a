//! Retry policy for failed send attempts
//!
//! Delays grow exponentially from `base_delay_ms`: the retry after attempt
//! `n` waits `min(base * 2^(n - 1), max) * (1 ± jitter)`.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per job, the first one included
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    ///
    /// Default: 1000ms
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single delay
    ///
    /// Default: 60000ms
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Randomises each delay within ±`jitter_factor`; must be finite and
    /// not negative
    ///
    /// Default: 0.0
    #[serde(
        default = "defaults::jitter_factor",
        deserialize_with = "deserialize_jitter"
    )]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Whether a job that has failed `failed_attempts` times may run again
    #[must_use]
    pub const fn should_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.max_attempts
    }

    /// Delay before retrying a job that has just failed for the
    /// `failed_attempts`-th time
    #[must_use]
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        calculate_retry_delay(
            failed_attempts,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
        )
    }
}

/// `min(base * 2^(attempt - 1), max)`, jittered by ±`jitter_factor`
///
/// `attempt` is 1-based.
#[must_use]
pub fn calculate_retry_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        max_delay_ms
    } else {
        base_delay_ms.saturating_mul(1u64 << exponent).min(max_delay_ms)
    };

    if !jitter_factor.is_finite() || jitter_factor <= 0.0 {
        return Duration::from_millis(delay);
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered = {
        let range = (delay as f64) * jitter_factor;
        let jitter: f64 = rand::rng().random_range(-range..=range);
        ((delay as f64) + jitter).max(0.0) as u64
    };

    Duration::from_millis(jittered)
}

fn deserialize_jitter<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let jitter = f64::deserialize(deserializer)?;
    if jitter.is_finite() && jitter >= 0.0 {
        Ok(jitter)
    } else {
        Err(serde::de::Error::custom(format!(
            "jitter_factor must be a finite, non-negative number, got {jitter}"
        )))
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_delay_ms() -> u64 {
        1000
    }

    pub const fn max_delay_ms() -> u64 {
        60_000
    }

    pub const fn jitter_factor() -> f64 {
        0.0
    }
}
