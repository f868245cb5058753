//! Retry with exponential backoff
//!
//! Used by the HTTP transport to retry opening a connection. Only the open is
//! retried: once a body has been handed to the reader, events may already have
//! reached the caller and a failure ends the turn.
//!
//! # Examples
//!
//! ```rust,no_run
//! use structured_stream::{RetryConfig, SessionOptions};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = SessionOptions::builder()
//!     .endpoint("http://localhost:8080/v1/responses")
//!     .retry(
//!         RetryConfig::default()
//!             .with_max_attempts(4)
//!             .with_initial_delay(Duration::from_millis(250)),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Random jitter as a fraction of the delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Clamped to 0.0..=1.0
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);

        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

/// Whether a failed open is worth another attempt.
///
/// Connect failures, timeouts, HTTP 429 and 5xx are transient. Client errors,
/// configuration and encoding problems are not.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Http(e) => e.is_connect() || e.is_timeout(),
        Error::Timeout => true,
        Error::Status { status, .. } => *status == 429 || (500..600).contains(status),
        _ => false,
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// attempts are exhausted. The last error is returned.
pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if is_retryable_error(&err) && attempt + 1 < config.max_attempts => {
                let delay = config.calculate_delay(attempt);
                tracing::debug!(attempt = attempt + 1, ?delay, error = %err, "retrying request");
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
