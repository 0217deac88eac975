//! Circuit breaker guarding a provider.
//!
//! ```text
//!   closed --(threshold consecutive failures)--> open
//!   open   --(cool-down elapsed, next caller)---> half_open (that caller is the trial)
//!   half_open --(trial succeeds)--> closed
//!   half_open --(trial fails)-----> open
//! ```
//!
//! While half-open exactly one trial call is in flight; everyone else fails
//! fast with `circuit_open`. All transitions happen under one lock.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use super::domain::EnrichmentError;

/// Breaker thresholds
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is let through
    pub cooldown: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected
    Open,
    /// One trial call tests recovery
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Health of one provider. Only the breaker mutates it.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
    pub opened_at: Option<Instant>,
    pub trial_in_flight: bool,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// Circuit breaker for one provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    config: CircuitConfig,
    health: Mutex<ProviderHealth>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            health: Mutex::new(ProviderHealth::default()),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn state(&self) -> CircuitState {
        self.health.lock().state
    }

    pub fn health(&self) -> ProviderHealth {
        self.health.lock().clone()
    }

    /// Ask to make a call. The returned permit must be settled with the outcome.
    pub fn acquire(&self) -> Result<CallPermit<'_>, EnrichmentError> {
        let mut health = self.health.lock();
        let now = Instant::now();

        let trial = match health.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = health
                    .opened_at
                    .is_some_and(|at| now.duration_since(at) >= self.config.cooldown);
                if !cooled {
                    return Err(self.open_error());
                }
                health.state = CircuitState::HalfOpen;
                health.trial_in_flight = true;
                tracing::info!(provider = %self.provider, "Circuit half-open, sending trial call");
                true
            }
            CircuitState::HalfOpen => {
                if health.trial_in_flight {
                    return Err(self.open_error());
                }
                health.trial_in_flight = true;
                true
            }
        };

        Ok(CallPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn on_success(&self, trial: bool) {
        let mut health = self.health.lock();
        health.consecutive_failures = 0;
        if trial {
            health.trial_in_flight = false;
            health.state = CircuitState::Closed;
            health.opened_at = None;
            tracing::info!(provider = %self.provider, "Circuit closed, provider recovered");
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut health = self.health.lock();
        let now = Instant::now();
        health.consecutive_failures += 1;
        health.last_failure = Some(now);

        if trial {
            health.trial_in_flight = false;
            health.state = CircuitState::Open;
            health.opened_at = Some(now);
            tracing::warn!(provider = %self.provider, "Trial call failed, circuit re-opened");
        } else if health.state == CircuitState::Closed
            && health.consecutive_failures >= self.config.failure_threshold
        {
            health.state = CircuitState::Open;
            health.opened_at = Some(now);
            tracing::warn!(
                provider = %self.provider,
                failures = health.consecutive_failures,
                "Circuit opened"
            );
        }
    }

    fn on_abandon(&self, trial: bool) {
        if trial {
            // Let the next caller run the trial instead
            self.health.lock().trial_in_flight = false;
        }
    }

    /// Force the breaker closed.
    pub fn reset(&self) {
        *self.health.lock() = ProviderHealth::default();
    }

    fn open_error(&self) -> EnrichmentError {
        EnrichmentError::CircuitOpen {
            provider: self.provider.clone(),
        }
    }
}

/// Permission to make one call through the breaker.
///
/// Dropping an unsettled permit releases a trial slot without changing state.
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandon(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new("test", CircuitConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    fn fail(b: &CircuitBreaker, times: u32) {
        for _ in 0..times {
            b.acquire().unwrap().failure();
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let b = breaker(3, 30);
        fail(&b, 2);
        assert_eq!(b.state(), CircuitState::Closed);
        fail(&b, 1);
        assert_eq!(b.state(), CircuitState::Open);
        assert!(matches!(b.acquire(), Err(EnrichmentError::CircuitOpen { .. })));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let b = breaker(3, 30);
        fail(&b, 2);
        b.acquire().unwrap().success();
        fail(&b, 2);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.health().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_after_cooldown() {
        let b = breaker(1, 30);
        fail(&b, 1);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(b.acquire().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = b.acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(b.state(), CircuitState::HalfOpen);

        // Concurrent callers are turned away while the trial is in flight
        assert!(matches!(b.acquire(), Err(EnrichmentError::CircuitOpen { .. })));

        trial.success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(!b.acquire().unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let b = breaker(1, 10);
        fail(&b, 1);
        tokio::time::advance(Duration::from_secs(10)).await;

        b.acquire().unwrap().failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.acquire().is_err());

        // Cool-down restarts from the failed trial
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(b.acquire().unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_frees_the_slot() {
        let b = breaker(1, 5);
        fail(&b, 1);
        tokio::time::advance(Duration::from_secs(5)).await;

        drop(b.acquire().unwrap());

        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.acquire().unwrap().is_trial());
    }

    #[test]
    fn test_reset() {
        let b = breaker(1, 30);
        fail(&b, 1);
        b.reset();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.health().consecutive_failures, 0);
    }
}
