//! Retry policy shared by the collection poller and the job monitor

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the delay grows across consecutive failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Every retry waits the base delay
    #[default]
    Fixed,
    /// base * factor^(n-1), capped at `max_delay_ms`
    Exponential { factor: u32, max_delay_ms: u64 },
}

/// Retry limits for a polling loop. The default retries forever at the base delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up (None for unlimited)
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn limited(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff: Backoff::Fixed,
        }
    }

    /// Whether another attempt may follow `failures` consecutive failures
    pub fn allows(&self, failures: u32) -> bool {
        match self.max_attempts {
            Some(max) => failures < max,
            None => true,
        }
    }

    /// Delay before the retry that follows the `failures`-th consecutive failure
    pub fn delay(&self, base: Duration, failures: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential {
                factor,
                max_delay_ms,
            } => {
                let exponent = failures.saturating_sub(1);
                let multiplier = factor.max(1).saturating_pow(exponent);
                let cap = Duration::from_millis(max_delay_ms).max(base);
                base.saturating_mul(multiplier).min(cap)
            }
        }
    }
}
