//! Retry classification and exponential backoff.
//!
//! Transient failures (connection errors, 408, 429, 5xx) are retried with
//! exponential backoff plus jitter; everything else surfaces immediately.

use std::time::Duration;

use serde::Deserialize;

/// Retry policy for a driver instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    32_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// S3 error code for a request whose signing timestamp is too far from
/// the server clock.
pub const REQUEST_TIME_TOO_SKEWED: &str = "RequestTimeTooSkewed";

/// Determine if an HTTP status code is retryable.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Determine if a rejection is a clock-skew artifact.
///
/// Skew rejections arrive as 403, which is otherwise terminal; a fresh
/// attempt is signed with a fresh timestamp, so these are retried.
pub fn is_clock_skew(status: u16, code: Option<&str>) -> bool {
    status == 403 && code == Some(REQUEST_TIME_TOO_SKEWED)
}

/// Calculate the delay before retry number `attempt` (zero-based).
///
/// Exponential growth capped at `max_delay`, plus uniform jitter bounded by
/// min(1s, initial_delay) to spread out synchronized retries.
pub fn backoff_for_attempt(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config
        .initial_delay()
        .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = base.min(config.max_delay());
    let jitter_bound = Duration::from_secs(1).min(config.initial_delay());
    let jitter = jitter_bound.mul_f64(rand::random::<f64>());
    capped + jitter
}
