//! Retry strategy with exponential backoff
//!
//! An explicit, iterative state machine: attempt counter, delay law, and a
//! caller-supplied retryability predicate. The delay before the retry that
//! follows attempt `n` (0-based) is `min(max_delay, base_delay * 2^n)`.
//! Jitter is supported but off by default, so the delay sequence is exact
//! unless a caller opts in.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Cap on the backoff exponent to prevent overflow
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Validation errors for retry configuration
#[derive(Debug, Error)]
pub enum RetryConfigError {
    #[error("Invalid retry configuration: {0}")]
    Invalid(String),
}

/// Retry strategy with configurable exponential backoff
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            jitter_factor: 0.0,
        }
    }
}

impl RetryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of retries after the initial attempt
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base delay for exponential backoff
    pub fn with_base_delay(mut self, delay: Duration) -> Result<Self, RetryConfigError> {
        if delay > self.max_delay {
            return Err(RetryConfigError::Invalid(format!(
                "base_delay ({delay:?}) cannot be greater than max_delay ({:?})",
                self.max_delay
            )));
        }
        self.base_delay = delay;
        Ok(self)
    }

    /// Set the maximum delay cap
    pub fn with_max_delay(mut self, delay: Duration) -> Result<Self, RetryConfigError> {
        if delay < self.base_delay {
            return Err(RetryConfigError::Invalid(format!(
                "max_delay ({delay:?}) cannot be less than base_delay ({:?})",
                self.base_delay
            )));
        }
        self.max_delay = delay;
        Ok(self)
    }

    /// Set the jitter factor (0.0 = deterministic delays, 1.0 = full jitter)
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Number of retries after the initial attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the retry following `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_millis = self.base_delay.as_millis() as u64;
        let max_millis = self.max_delay.as_millis() as u64;

        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let multiplier = 2_u64.saturating_pow(exponent);
        let delay_millis = base_millis.saturating_mul(multiplier).min(max_millis);

        self.apply_jitter(Duration::from_millis(delay_millis))
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }

        let mut rng = rand::thread_rng();
        let delay_millis = delay.as_millis() as f64;
        let jitter_range = delay_millis * self.jitter_factor;
        let jitter = rng.gen_range(-jitter_range / 2.0..=jitter_range / 2.0);

        Duration::from_millis((delay_millis + jitter).max(0.0) as u64)
    }

    /// Execute `operation` with retry semantics.
    ///
    /// `is_retryable` decides whether a failure is transient. A transient
    /// failure with attempts remaining sleeps `delay_for(attempt)` and tries
    /// again; anything else returns immediately. An always-failing transient
    /// operation therefore runs exactly `max_retries + 1` times, with the
    /// retries strictly serial and never overlapping.
    pub async fn execute<F, Fut, T, E, R>(
        &self,
        operation_name: &str,
        mut operation: F,
        is_retryable: R,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 0 {
                        warn!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            error = %err,
                            "giving up after retries"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}
