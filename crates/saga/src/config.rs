//! Saga tuning.

use std::time::Duration;

/// Retry behavior for compensating releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationPolicy {
    /// Attempts per release, including the first one. Values below 1 are
    /// treated as 1.
    pub max_attempts: u32,

    /// Delay between attempts.
    pub backoff: Duration,
}

impl CompensationPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for CompensationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Settings for [`crate::OrderSaga`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    /// Upper bound on every pricing and stock call.
    pub call_timeout: Duration,

    /// How compensating releases are retried.
    pub compensation: CompensationPolicy,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            compensation: CompensationPolicy::default(),
        }
    }
}
