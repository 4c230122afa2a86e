use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::shared::ValidationError;
use crate::shared::base::require_non_empty;

/// Settings for the web API that receives uploaded records.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API, for example `https://example.com`.
    pub base_url: String,
    /// Path appended to [`ApiConfig::base_url`] for uploads, for example `/api/users/sync`.
    pub upload_endpoint: String,
    /// Per-request timeout in seconds.
    ///
    /// Kept signed so that a zero or negative value is reported as invalid rather than as a
    /// parse failure.
    pub timeout: i64,
    /// Retry behavior for transient upload failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ApiConfig {
    /// Validates the API settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("api.base_url", &self.base_url)?;
        require_non_empty("api.upload_endpoint", &self.upload_endpoint)?;

        if self.timeout <= 0 {
            return Err(ValidationError::NonPositiveTimeout {
                value: self.timeout,
            });
        }

        let url = Url::parse(&self.base_url).map_err(|err| ValidationError::InvalidUrl {
            field: "api.base_url".to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidUrl {
                field: "api.base_url".to_string(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }

        if !self.upload_endpoint.starts_with('/') {
            return Err(ValidationError::InvalidFieldValue {
                field: "api.upload_endpoint".to_string(),
                constraint: "must start with `/`".to_string(),
            });
        }

        self.retry.validate()
    }

    /// Returns the full upload URL, `base_url` followed by `upload_endpoint`.
    pub fn upload_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.upload_endpoint
        )
    }

    /// Returns the per-request timeout.
    ///
    /// Only meaningful after [`ApiConfig::validate`] succeeded.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(0) as u64)
    }
}

/// Exponential backoff settings for retrying an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per batch, the first one included.
    ///
    /// Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt.
    ///
    /// Default: 1000ms
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay.
    ///
    /// Default: 30000ms
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Factor applied to the delay after every failed attempt. Must be > 1.0.
    ///
    /// Default: 2.0
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Default number of attempts per batch.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Default delay before the first retry.
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;

    /// Default cap for retry delays.
    pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

    /// Default backoff multiplier.
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Validates the retry settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "api.retry.max_attempts".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.backoff_multiplier.is_nan() || self.backoff_multiplier <= 1.0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "api.retry.backoff_multiplier".to_string(),
                constraint: "must be greater than 1.0".to_string(),
            });
        }

        if self.initial_delay_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "api.retry.initial_delay_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.initial_delay_ms >= self.max_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "api.retry.initial_delay_ms".to_string(),
                constraint: "must be less than max_delay_ms".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the initial retry delay as a Duration.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Returns the maximum retry delay as a Duration.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    RetryConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    RetryConfig::DEFAULT_INITIAL_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    RetryConfig::DEFAULT_MAX_DELAY_MS
}

fn default_backoff_multiplier() -> f64 {
    RetryConfig::DEFAULT_BACKOFF_MULTIPLIER
}
