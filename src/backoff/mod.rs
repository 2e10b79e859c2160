//! Exponential backoff policy for transient send failures.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Deserialize;

/// Retry/backoff configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    /// Base delay in seconds for the first retry
    #[serde(default = "default_base_secs")]
    pub base_secs: u64,
    /// Maximum delay in seconds
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Maximum total attempts before a key is exhausted
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0) applied as ± around the delay
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_base_secs() -> u64 {
    60
}

fn default_max_delay_secs() -> u64 {
    900 // 15 minutes
}

fn default_max_attempts() -> u32 {
    3
}

fn default_jitter_factor() -> f64 {
    0.2
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: default_base_secs(),
            max_delay_secs: default_max_delay_secs(),
            max_attempts: default_max_attempts(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// Decision for a key after a transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again at the given time.
    Pending { next_retry_at: DateTime<Utc> },
    /// Attempt budget spent; no further retries.
    Exhausted,
}

/// Stateless retry policy: `delay = base * 2^(attempts-1)`, capped, with
/// symmetric jitter to spread retries from a burst of failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: BackoffConfig,
}

impl RetryPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Decide the next step after attempt number `attempts` (1-based)
    /// failed transiently at `now`.
    pub fn next_attempt(&self, attempts: u32, now: DateTime<Utc>) -> RetryDecision {
        if attempts >= self.config.max_attempts {
            return RetryDecision::Exhausted;
        }

        let exponent = attempts.saturating_sub(1).min(32);
        let base = self.config.base_secs.saturating_mul(1u64 << exponent);
        let capped = base.min(self.config.max_delay_secs) as f64;

        let delay_secs = if self.config.jitter_factor > 0.0 {
            let jitter_range = capped * self.config.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
            (capped + jitter).max(1.0)
        } else {
            capped.max(1.0)
        };

        RetryDecision::Pending {
            next_retry_at: now + Duration::milliseconds((delay_secs * 1000.0) as i64),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
