//! Bounded exponential backoff with jitter.
//!
//! Only transient provider failures (timeouts, 5xx, connection errors, 429)
//! are retried. The delay before retry `n` (0-based) is
//! `min(base * multiplier^n, max_delay)` scaled by a random factor in
//! `[0.5, 1.0]` so concurrent callers don't retry in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::domain::{EnrichmentError, ProviderError};

/// Retry parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Capped delay before retry `attempt`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let cap = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= cap {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Delay before retry `attempt` with jitter applied.
    pub fn jittered(&self, attempt: u32) -> Duration {
        let jitter = rand::rng().random_range(0.5..=1.0);
        self.backoff(attempt).mul_f64(jitter)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// `op` receives the 0-based attempt number. Exhaustion surfaces the last
    /// observed error as [`EnrichmentError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, EnrichmentError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err.into()),
                Err(err) if attempt >= self.max_retries => {
                    tracing::warn!(attempts = attempt + 1, error = %err, "Retries exhausted");
                    return Err(EnrichmentError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.jittered(attempt);
                    tracing::debug!(
                        attempt,
                        ?delay,
                        error = %err,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
