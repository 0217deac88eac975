//! Guard composition around the single "call provider" primitive.
//!
//! A provider call goes through, in order:
//!
//! 1. the [`RateGovernor`], which charges the estimated cost or denies;
//! 2. the [`CircuitBreaker`], which fails fast while the provider is unhealthy;
//! 3. the [`RetryPolicy`], which re-issues transient failures with backoff;
//! 4. a per-attempt timeout around [`EnrichmentProvider::enrich`].
//!
//! Each guard is its own type and is tested on its own; this module only
//! wires them together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::cache::EnrichmentCache;
use super::circuit::CircuitBreaker;
use super::domain::{EnrichedRecord, EnrichmentError, ProviderError, ProviderQuery, ProviderReply};
use super::fingerprint::Fingerprint;
use super::governor::{Admission, RateGovernor};
use super::retry::RetryPolicy;
use super::traits::EnrichmentProvider;

/// Per-fingerprint outcome of a guarded call.
pub type LookupOutcomes = HashMap<Fingerprint, Result<EnrichedRecord, EnrichmentError>>;

/// A provider wrapped in governor, breaker and retry guards.
pub struct GuardedProvider {
    provider: Arc<dyn EnrichmentProvider>,
    governor: Arc<RateGovernor>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    cost_per_lookup: u64,
    attempt_timeout: Duration,
}

impl GuardedProvider {
    pub fn new(
        provider: Arc<dyn EnrichmentProvider>,
        governor: Arc<RateGovernor>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            governor,
            breaker,
            retry,
            cost_per_lookup: 1,
            attempt_timeout: Duration::from_secs(15),
        }
    }

    /// Credits charged per identity in a call.
    pub fn with_cost_per_lookup(mut self, cost: u64) -> Self {
        self.cost_per_lookup = cost;
        self
    }

    /// Upper bound on a single provider attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Issue one guarded provider call for `queries`.
    ///
    /// The whole call is admitted or denied as a unit.
    pub async fn call(&self, queries: &[ProviderQuery]) -> Result<ProviderReply, EnrichmentError> {
        let name = self.provider.name();
        let cost = self.cost_per_lookup * queries.len() as u64;

        if let Admission::Deny(reason) = self.governor.admit(name, cost) {
            return Err(reason.into_error(name));
        }
        self.dispatch(queries, cost).await
    }

    /// Guarded call whose successful entries are written to `cache`.
    ///
    /// When the governor can afford only some of the lookups, the leading
    /// queries it admits are dispatched and the rest resolve to the denial.
    /// The cache ticket is taken before dispatch so an invalidation that
    /// lands while the call is in flight wins over the late result.
    pub async fn fetch_through(
        &self,
        cache: &EnrichmentCache,
        queries: &[ProviderQuery],
    ) -> Result<LookupOutcomes, EnrichmentError> {
        let name = self.provider.name();
        let (admitted, denial) = self
            .governor
            .admit_up_to(name, self.cost_per_lookup, queries.len());
        if admitted == 0 {
            return match denial {
                Some(reason) => Err(reason.into_error(name)),
                None => Ok(LookupOutcomes::new()),
            };
        }

        let (dispatched, denied) = queries.split_at(admitted);
        let ticket = cache.ticket();
        let cost = self.cost_per_lookup * admitted as u64;
        let mut reply = self.dispatch(dispatched, cost).await?;

        let mut outcomes = LookupOutcomes::with_capacity(queries.len());
        for query in dispatched {
            let outcome = take_entry(&mut reply, &query.fingerprint);
            if let Ok(record) = &outcome {
                cache.store_record(&query.fingerprint, record, ticket);
            }
            outcomes.insert(query.fingerprint.clone(), outcome);
        }
        if let Some(reason) = denial {
            for query in denied {
                outcomes.insert(query.fingerprint.clone(), Err(reason.clone().into_error(name)));
            }
        }
        Ok(outcomes)
    }

    /// Breaker, retry and per-attempt timeout around an admitted call.
    async fn dispatch(
        &self,
        queries: &[ProviderQuery],
        cost: u64,
    ) -> Result<ProviderReply, EnrichmentError> {
        let name = self.provider.name();
        let permit = match self.breaker.acquire() {
            Ok(permit) => permit,
            Err(err) => {
                // Never reached the provider, so nothing was billed
                self.governor.refund(name, cost);
                return Err(err);
            }
        };

        let provider = self.provider.as_ref();
        let timeout = self.attempt_timeout;
        let outcome = self
            .retry
            .run(move |attempt| async move {
                if attempt > 0 {
                    tracing::debug!(provider = name, attempt, "Retrying provider call");
                }
                tokio::time::timeout(timeout, provider.enrich(queries))
                    .await
                    .unwrap_or(Err(ProviderError::Timeout))
            })
            .await;

        match &outcome {
            Err(err) if err.indicates_provider_failure() => permit.failure(),
            _ => permit.success(),
        }
        outcome
    }
}

/// Resolve one query's slice of a provider reply.
///
/// A missing or empty entry means the provider had no match.
pub fn take_entry(
    reply: &mut ProviderReply,
    fingerprint: &Fingerprint,
) -> Result<EnrichedRecord, EnrichmentError> {
    match reply.remove(fingerprint) {
        Some(Ok(record)) if !record.is_empty() => Ok(record),
        Some(Ok(_)) | None => Err(EnrichmentError::ProviderNotFound),
        Some(Err(err)) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::circuit::{CircuitConfig, CircuitState};
    use crate::enrichment::domain::EnrichmentRequest;
    use crate::enrichment::fingerprint;
    use crate::enrichment::governor::GovernorConfig;
    use crate::enrichment::traits::mocks::MockProvider;

    fn query(company: &str) -> ProviderQuery {
        let resolved =
            fingerprint::resolve(&EnrichmentRequest::new(company).company(company)).unwrap();
        ProviderQuery {
            fingerprint: resolved.fingerprint,
            identity: resolved.identity,
            known: None,
        }
    }

    struct Harness {
        mock: Arc<MockProvider>,
        governor: Arc<RateGovernor>,
        breaker: Arc<CircuitBreaker>,
        guarded: GuardedProvider,
    }

    fn harness(mock: MockProvider, governor: GovernorConfig, retry: RetryPolicy) -> Harness {
        let mock = Arc::new(mock);
        let governor = Arc::new(RateGovernor::new(governor));
        let breaker = Arc::new(CircuitBreaker::new("mock", CircuitConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(30),
        }));
        let guarded =
            GuardedProvider::new(mock.clone(), governor.clone(), breaker.clone(), retry)
                .with_attempt_timeout(Duration::from_secs(1));
        Harness {
            mock,
            governor,
            breaker,
            guarded,
        }
    }

    #[tokio::test]
    async fn test_successful_call_charges_per_lookup() {
        let h = harness(MockProvider::new(), GovernorConfig::default(), RetryPolicy::none());

        let reply = h.guarded.call(&[query("Acme"), query("Globex")]).await.unwrap();

        assert_eq!(reply.len(), 2);
        let spend = h.governor.snapshot("mock").unwrap();
        assert_eq!(spend.daily_spent, 2);
        assert_eq!(spend.total_calls, 1);
    }

    #[tokio::test]
    async fn test_governor_denial_skips_provider() {
        let h = harness(
            MockProvider::new(),
            GovernorConfig {
                daily_cap: Some(1),
                ..Default::default()
            },
            RetryPolicy::none(),
        );

        h.guarded.call(&[query("Acme")]).await.unwrap();
        let err = h.guarded.call(&[query("Acme")]).await.unwrap_err();

        assert_eq!(err.code(), "daily_cap_exceeded");
        assert_eq!(h.mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast_and_refunds() {
        let h = harness(
            MockProvider::new().failing(ProviderError::Timeout),
            GovernorConfig::default(),
            RetryPolicy::none(),
        );

        for _ in 0..2 {
            let err = h.guarded.call(&[query("Acme")]).await.unwrap_err();
            assert_eq!(err.code(), "retries_exhausted");
        }
        assert_eq!(h.breaker.state(), CircuitState::Open);
        let spent_before = h.governor.snapshot("mock").unwrap().daily_spent;

        let err = h.guarded.call(&[query("Acme")]).await.unwrap_err();

        assert_eq!(err.code(), "circuit_open");
        assert_eq!(h.mock.call_count(), 2);
        assert_eq!(h.governor.snapshot("mock").unwrap().daily_spent, spent_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_time_out_and_retry() {
        let h = harness(
            MockProvider::new().with_delay(Duration::from_secs(5)),
            GovernorConfig::default(),
            RetryPolicy {
                max_retries: 2,
                ..Default::default()
            },
        );

        let err = h.guarded.call(&[query("Acme")]).await.unwrap_err();

        assert_eq!(
            err,
            EnrichmentError::RetriesExhausted {
                attempts: 3,
                last: ProviderError::Timeout
            }
        );
        assert_eq!(h.mock.call_count(), 3);
        // One admission covers all attempts
        assert_eq!(h.governor.snapshot("mock").unwrap().total_calls, 1);
    }

    #[tokio::test]
    async fn test_permanent_errors_do_not_trip_the_breaker() {
        let h = harness(
            MockProvider::new().failing(ProviderError::Validation("bad payload".into())),
            GovernorConfig::default(),
            RetryPolicy::none(),
        );

        for _ in 0..3 {
            let err = h.guarded.call(&[query("Acme")]).await.unwrap_err();
            assert_eq!(err.code(), "provider_error");
        }
        assert_eq!(h.breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_auth_errors_trip_the_breaker() {
        let h = harness(
            MockProvider::new().failing(ProviderError::Auth("revoked".into())),
            GovernorConfig::default(),
            RetryPolicy::none(),
        );

        for _ in 0..2 {
            h.guarded.call(&[query("Acme")]).await.unwrap_err();
        }
        assert_eq!(h.breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_fetch_through_caches_only_successes() {
        let h = harness(
            MockProvider::new()
                .omitting(&["globex"])
                .with_entry_error("initech", ProviderError::Validation("bad".into())),
            GovernorConfig::default(),
            RetryPolicy::none(),
        );
        let cache = EnrichmentCache::default();
        let (acme, globex, initech) = (query("Acme"), query("Globex"), query("Initech"));

        let outcomes = h
            .guarded
            .fetch_through(&cache, &[acme.clone(), globex.clone(), initech.clone()])
            .await
            .unwrap();

        assert!(outcomes[&acme.fingerprint].is_ok());
        assert_eq!(
            outcomes[&globex.fingerprint],
            Err(EnrichmentError::ProviderNotFound)
        );
        assert_eq!(outcomes[&initech.fingerprint].as_ref().unwrap_err().code(), "provider_error");

        assert!(cache.lookup_payload(&acme.fingerprint).is_some());
        assert!(cache.lookup_identity(&acme.fingerprint).is_some());
        assert!(cache.lookup_payload(&globex.fingerprint).is_none());
        assert!(cache.lookup_payload(&initech.fingerprint).is_none());
    }

    #[tokio::test]
    async fn test_fetch_through_dispatches_what_the_cap_allows() {
        let h = harness(
            MockProvider::new(),
            GovernorConfig {
                daily_cap: Some(2),
                ..Default::default()
            },
            RetryPolicy::none(),
        );
        let cache = EnrichmentCache::default();
        let queries = [query("Acme"), query("Globex"), query("Initech")];

        let outcomes = h.guarded.fetch_through(&cache, &queries).await.unwrap();

        assert!(outcomes[&queries[0].fingerprint].is_ok());
        assert!(outcomes[&queries[1].fingerprint].is_ok());
        assert_eq!(
            outcomes[&queries[2].fingerprint].as_ref().unwrap_err().code(),
            "daily_cap_exceeded"
        );
        let batches = h.mock.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert!(cache.lookup_payload(&queries[2].fingerprint).is_none());
        assert_eq!(h.governor.snapshot("mock").unwrap().daily_spent, 2);

        // Exhausted: the whole call is denied without reaching the provider
        let err = h.guarded.fetch_through(&cache, &queries[2..]).await.unwrap_err();
        assert_eq!(err.code(), "daily_cap_exceeded");
        assert_eq!(h.mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_during_flight_wins() {
        let h = harness(
            MockProvider::new().with_delay(Duration::from_millis(100)),
            GovernorConfig::default(),
            RetryPolicy::none(),
        );
        let cache = Arc::new(EnrichmentCache::default());
        let acme = query("Acme");

        let guarded = Arc::new(h.guarded);
        let task = {
            let (guarded, cache, acme) = (guarded.clone(), cache.clone(), acme.clone());
            tokio::spawn(async move { guarded.fetch_through(&cache, &[acme]).await })
        };

        // Let the call start, then invalidate while it sleeps
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&acme.fingerprint);

        let outcomes = task.await.unwrap().unwrap();
        assert!(outcomes[&acme.fingerprint].is_ok());
        assert!(cache.lookup_payload(&acme.fingerprint).is_none());
    }

    #[test]
    fn test_take_entry_treats_empty_record_as_not_found() {
        let fp = Fingerprint::from_hex("aa");
        let mut reply = ProviderReply::new();
        reply.insert(fp.clone(), Ok(EnrichedRecord::default()));
        assert_eq!(take_entry(&mut reply, &fp), Err(EnrichmentError::ProviderNotFound));
    }
}
