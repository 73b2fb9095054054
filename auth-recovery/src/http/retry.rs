//! Exponential backoff for transient transport failures.
//!
//! This policy only sees what `reqwest_retry` considers transient (connection errors, 5xx,
//! 408, 429). Authentication failures are never transient and are left to the recovery
//! orchestrator and its retry ledger.

use std::time::{Duration, SystemTime};

use reqwest_retry::{RetryDecision, RetryPolicy};

/// Exponential backoff retry policy.
///
/// Retries transient failures with exponentially increasing delays, capped at a maximum.
pub struct TransientRetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl TransientRetryPolicy {
    /// Create a new retry policy with default delays.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Maximum number of transient retries, `0` disables retrying
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }

    fn exponential_delay(&self, n_attempts: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * 2_f64.powi(n_attempts as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

impl RetryPolicy for TransientRetryPolicy {
    fn should_retry(&self, _request_start_time: SystemTime, n_past_retries: u32) -> RetryDecision {
        if n_past_retries >= self.max_retries {
            RetryDecision::DoNotRetry
        } else {
            let delay = self.exponential_delay(n_past_retries);
            RetryDecision::Retry {
                execute_after: SystemTime::now() + delay,
            }
        }
    }
}
