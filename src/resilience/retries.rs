//! Retry policy.
//!
//! # Responsibilities
//! - Decide whether a failed delivery attempt is retried
//! - Compute the jittered delay before the next attempt
//!
//! # Design Decisions
//! - `max_duration` bounds both the single delay and the total time spent
//! - Connection failures, timeouts, 429 and 5xx are retryable; other
//!   client errors are not

use std::time::Duration;

use axum::http::StatusCode;

use crate::config::schema::RetryConfig;
use crate::resilience::backoff::backoff_with_jitter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub max_duration: Duration,
    pub interval: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            max_duration: Duration::ZERO,
            interval: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        backoff_with_jitter(attempt, self.interval, self.max_duration)
    }

    /// Whether another attempt may follow `attempt` completed attempts,
    /// `elapsed` after the first one started.
    pub fn should_retry(&self, attempt: u32, elapsed: Duration) -> bool {
        self.enabled && attempt < self.max_attempts && elapsed < self.max_duration
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts.max(1),
            max_duration: config.max_duration,
            interval: config.interval,
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.status().is_some_and(is_retryable_status)
}
