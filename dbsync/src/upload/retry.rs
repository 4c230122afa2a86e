use std::time::Duration;

use dbsync_config::shared::RetryConfig;
use reqwest::StatusCode;

/// Deterministic exponential backoff for a single batch.
///
/// The delay before the `n`-th retry is `min(initial * multiplier^(n - 1), max)`. There is no
/// jitter, so delays strictly increase until they reach the cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Total number of attempts per batch, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay to wait before retry number `retry`, counted from one.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;

        Duration::from_millis(delay_ms.min(max_ms) as u64)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_delay(),
            config.max_delay(),
            config.backoff_multiplier,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// How a response status is handled by the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx: the batch was accepted.
    Success,
    /// 4xx: the API refused the batch; retrying would not help.
    Rejected,
    /// 5xx: the API failed; the batch is retried.
    Retryable,
    /// Anything else, for example an unfollowed redirect. Not retried.
    Unexpected,
}

/// Classifies a response status.
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status.is_client_error() {
        StatusClass::Rejected
    } else if status.is_server_error() {
        StatusClass::Retryable
    } else {
        StatusClass::Unexpected
    }
}
