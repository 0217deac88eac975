//! Enrichment service - orchestrates cached, guarded provider lookups
//!
//! This is the high-level API for enriching contacts:
//! 1. Resolve the request's identity fingerprint
//! 2. Answer from the payload cache when possible
//! 3. On a miss, reuse a cached identity match so the provider can skip matching
//! 4. Call the provider through governor, circuit breaker and retry guards
//! 5. Cache and return the fresh result
//!
//! Batch lookups route their cache misses through the [`BatchCoordinator`];
//! cache hits never enter a batch. Concurrent single lookups for the same
//! fingerprint share one provider call.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::enrichment::{
    batch::{BatchConfig, BatchCoordinator},
    cache::{CacheConfig, CacheStats, EnrichmentCache},
    circuit::{CircuitBreaker, CircuitConfig, ProviderHealth},
    domain::{
        EnrichedRecord, EnrichmentError, EnrichmentRequest, EnrichmentResult, Provenance,
        ProviderQuery, RequestId,
    },
    fingerprint::{self, Fingerprint, ResolvedIdentity},
    governor::{GovernorConfig, RateGovernor, SpendSnapshot},
    pipeline::GuardedProvider,
    retry::RetryPolicy,
    traits::EnrichmentProvider,
};

/// Configuration for the enrichment service
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub cache: CacheConfig,
    pub governor: GovernorConfig,
    pub circuit: CircuitConfig,
    pub retry: RetryPolicy,
    pub batch: BatchConfig,
    /// Credits charged per identity sent to the provider
    pub cost_per_lookup: u64,
    /// Upper bound on a single provider attempt
    pub attempt_timeout: Duration,
    /// Upper bound on one caller's wait, including batching and retries
    pub caller_timeout: Duration,
    /// Period of the background cache sweep (`None` disables it)
    pub sweep_interval: Option<Duration>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            governor: GovernorConfig::default(),
            circuit: CircuitConfig::default(),
            retry: RetryPolicy::default(),
            batch: BatchConfig::default(),
            cost_per_lookup: 1,
            attempt_timeout: Duration::from_secs(15),
            caller_timeout: Duration::from_secs(30),
            sweep_interval: Some(Duration::from_secs(300)),
        }
    }
}

impl EnrichmentConfig {
    /// Reject values the guards cannot work with.
    pub fn validate(&self) -> Result<(), EnrichmentError> {
        let invalid = |msg: &str| Err(EnrichmentError::InvalidConfig(msg.to_string()));

        if self.cache.identity_ttl.is_zero() || self.cache.payload_ttl.is_zero() {
            return invalid("cache TTLs must be greater than zero");
        }
        if self.governor.daily_cap == Some(0) || self.governor.monthly_cap == Some(0) {
            return invalid("spend caps must be greater than zero when set");
        }
        if self.governor.requests_per_minute == Some(0) {
            return invalid("requests_per_minute must be greater than zero when set");
        }
        if self.circuit.failure_threshold == 0 {
            return invalid("circuit failure_threshold must be at least 1");
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return invalid("retry multiplier must be at least 1.0");
        }
        if self.retry.max_delay < self.retry.base_delay {
            return invalid("retry max_delay must not be below base_delay");
        }
        if self.batch.max_batch_size == 0 {
            return invalid("batch max_batch_size must be at least 1");
        }
        if self.attempt_timeout.is_zero() || self.caller_timeout.is_zero() {
            return invalid("timeouts must be greater than zero");
        }
        if self.cache.tombstone_retention <= self.longest_call() {
            return invalid(
                "cache tombstone_retention must exceed the longest provider call \
                 (attempt timeout across all retries plus backoff)",
            );
        }
        Ok(())
    }

    /// Worst-case duration of one guarded provider call.
    ///
    /// A tombstone must outlive any call that started before it was written.
    pub fn longest_call(&self) -> Duration {
        let retries = self.retry.max_retries;
        let attempts = self
            .attempt_timeout
            .checked_mul(retries.saturating_add(1))
            .unwrap_or(Duration::MAX);
        let backoff = self
            .retry
            .max_delay
            .checked_mul(retries)
            .unwrap_or(Duration::MAX);
        attempts.saturating_add(backoff)
    }
}

/// Shared mutable state, injectable so several services can share one budget.
#[derive(Clone)]
pub struct SharedState {
    pub cache: Arc<EnrichmentCache>,
    pub governor: Arc<RateGovernor>,
    pub breaker: Arc<CircuitBreaker>,
}

impl SharedState {
    /// Fresh state for `provider` built from `config`.
    pub fn new(provider: &str, config: &EnrichmentConfig) -> Self {
        Self {
            cache: Arc::new(EnrichmentCache::new(config.cache.clone())),
            governor: Arc::new(RateGovernor::new(config.governor.clone())),
            breaker: Arc::new(CircuitBreaker::new(provider, config.circuit.clone())),
        }
    }
}

/// Monitoring view of the service
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub provider: String,
    pub cache: CacheStats,
    pub cached_fingerprints: usize,
    /// `None` until the first billable call
    pub spend: Option<SpendSnapshot>,
    pub health: ProviderHealth,
}

type SharedLookup = Shared<BoxFuture<'static, Result<EnrichedRecord, EnrichmentError>>>;

/// A single-identity provider call that later callers can join.
struct Flight {
    id: u64,
    lookup: SharedLookup,
}

type FlightMap = Arc<Mutex<HashMap<Fingerprint, Flight>>>;

/// Service for enriching contacts from an external provider
pub struct EnrichmentService {
    config: EnrichmentConfig,
    state: SharedState,
    guarded: Arc<GuardedProvider>,
    batcher: BatchCoordinator,
    in_flight: FlightMap,
    next_flight: AtomicU64,
    background: Vec<JoinHandle<()>>,
}

impl EnrichmentService {
    /// Create a service with its own cache, ledger and breaker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: EnrichmentConfig,
        provider: Arc<dyn EnrichmentProvider>,
    ) -> Result<Self, EnrichmentError> {
        let state = SharedState::new(provider.name(), &config);
        Self::with_state(config, provider, state)
    }

    /// Create a service around existing shared state.
    pub fn with_state(
        config: EnrichmentConfig,
        provider: Arc<dyn EnrichmentProvider>,
        state: SharedState,
    ) -> Result<Self, EnrichmentError> {
        config.validate()?;

        let guarded = Arc::new(
            GuardedProvider::new(
                provider,
                state.governor.clone(),
                state.breaker.clone(),
                config.retry.clone(),
            )
            .with_cost_per_lookup(config.cost_per_lookup)
            .with_attempt_timeout(config.attempt_timeout),
        );

        let (batcher, collector) =
            BatchCoordinator::spawn(guarded.clone(), state.cache.clone(), config.batch.clone());
        let mut background = vec![collector];
        if let Some(every) = config.sweep_interval.filter(|d| !d.is_zero()) {
            background.push(state.cache.clone().spawn_sweeper(every));
        }

        tracing::debug!(provider = guarded.provider_name(), "Enrichment service started");

        Ok(Self {
            config,
            state,
            guarded,
            batcher,
            in_flight: Arc::default(),
            next_flight: AtomicU64::new(0),
            background,
        })
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Enrich a single request.
    ///
    /// The provider call runs on its own task: if this caller times out or
    /// is dropped after dispatch, the call still completes and its result is
    /// cached for the next caller. A caller whose fingerprint already has a
    /// call in flight waits for that call instead of issuing another.
    pub async fn enrich_one(
        &self,
        request: &EnrichmentRequest,
    ) -> Result<EnrichmentResult, EnrichmentError> {
        let resolved = fingerprint::resolve(request)?;
        if let Some(hit) = self.cached(request, &resolved) {
            return Ok(hit);
        }

        let lookup = self.join_or_dispatch(&resolved);
        let record = match tokio::time::timeout(self.config.caller_timeout, lookup).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                tracing::warn!(request = %request.id, "Enrichment timed out waiting for provider");
                return Err(EnrichmentError::TimedOut);
            }
        };

        Ok(self.fresh(request, resolved, record))
    }

    /// Enrich many requests, batching the cache misses.
    ///
    /// Every request id maps to its own outcome; one failing entry never
    /// fails the others. If ids repeat, the last request with that id wins.
    pub async fn enrich_batch(
        &self,
        requests: &[EnrichmentRequest],
    ) -> HashMap<RequestId, Result<EnrichmentResult, EnrichmentError>> {
        let mut results = HashMap::with_capacity(requests.len());
        let mut misses = Vec::new();

        for request in requests {
            let resolved = match fingerprint::resolve(request) {
                Ok(resolved) => resolved,
                Err(err) => {
                    results.insert(request.id.clone(), Err(err));
                    continue;
                }
            };
            if let Some(hit) = self.cached(request, &resolved) {
                results.insert(request.id.clone(), Ok(hit));
                continue;
            }

            let submit = self.batcher.submit(self.query_for(&resolved));
            let timeout = self.config.caller_timeout;
            misses.push(async move {
                let outcome = tokio::time::timeout(timeout, submit)
                    .await
                    .unwrap_or(Err(EnrichmentError::TimedOut));
                (request, resolved, outcome)
            });
        }

        tracing::debug!(
            total = requests.len(),
            misses = misses.len(),
            "Enriching batch"
        );

        for (request, resolved, outcome) in join_all(misses).await {
            let result = outcome.map(|record| self.fresh(request, resolved, record));
            results.insert(request.id.clone(), result);
        }
        results
    }

    /// Drop cached data for this identity so the next lookup goes to the provider.
    ///
    /// A call already in flight for the identity is detached: it still
    /// answers its own callers, but later lookups start a new call.
    pub fn invalidate(&self, request: &EnrichmentRequest) -> Result<Fingerprint, EnrichmentError> {
        let resolved = fingerprint::resolve(request)?;
        self.state.cache.invalidate(&resolved.fingerprint);
        self.in_flight.lock().remove(&resolved.fingerprint);
        tracing::info!(
            request = %request.id,
            fingerprint = %resolved.fingerprint,
            "Invalidated cached enrichment"
        );
        Ok(resolved.fingerprint)
    }

    /// Re-enrich from the provider, bypassing and replacing cached data.
    pub async fn refresh(
        &self,
        request: &EnrichmentRequest,
    ) -> Result<EnrichmentResult, EnrichmentError> {
        self.invalidate(request)?;
        self.enrich_one(request).await
    }

    pub fn status(&self) -> ServiceStatus {
        let provider = self.guarded.provider_name().to_string();
        ServiceStatus {
            cache: self.state.cache.stats(),
            cached_fingerprints: self.state.cache.len(),
            spend: self.state.governor.snapshot(&provider),
            health: self.state.breaker.health(),
            provider,
        }
    }

    fn cached(
        &self,
        request: &EnrichmentRequest,
        resolved: &ResolvedIdentity,
    ) -> Option<EnrichmentResult> {
        let record = self.state.cache.lookup_payload(&resolved.fingerprint)?;
        tracing::debug!(request = %request.id, fingerprint = %resolved.fingerprint, "Cache hit");
        Some(EnrichmentResult::new(
            request.id.clone(),
            resolved.fingerprint.clone(),
            &resolved.identity,
            record,
            Provenance::Cached,
        ))
    }

    /// The in-flight call for this fingerprint, or a newly dispatched one.
    fn join_or_dispatch(&self, resolved: &ResolvedIdentity) -> SharedLookup {
        let mut in_flight = self.in_flight.lock();
        if let Some(flight) = in_flight.get(&resolved.fingerprint) {
            tracing::debug!(fingerprint = %resolved.fingerprint, "Joining in-flight lookup");
            return flight.lookup.clone();
        }

        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let query = self.query_for(resolved);
        let guarded = self.guarded.clone();
        let cache = self.state.cache.clone();
        let registry = self.in_flight.clone();
        let call = tokio::spawn(async move {
            let fingerprint = query.fingerprint.clone();
            let outcome = match guarded
                .fetch_through(&cache, std::slice::from_ref(&query))
                .await
            {
                Ok(mut outcomes) => outcomes
                    .remove(&fingerprint)
                    .unwrap_or(Err(EnrichmentError::ProviderNotFound)),
                Err(err) => Err(err),
            };

            // Only retire our own entry; an invalidation may have replaced it
            let mut flights = registry.lock();
            if flights.get(&fingerprint).is_some_and(|f| f.id == id) {
                flights.remove(&fingerprint);
            }
            outcome
        });

        let lookup = async move {
            call.await
                .unwrap_or_else(|join_err| Err(EnrichmentError::Unavailable(join_err.to_string())))
        }
        .boxed()
        .shared();
        in_flight.insert(resolved.fingerprint.clone(), Flight {
            id,
            lookup: lookup.clone(),
        });
        lookup
    }

    fn query_for(&self, resolved: &ResolvedIdentity) -> ProviderQuery {
        ProviderQuery {
            fingerprint: resolved.fingerprint.clone(),
            identity: resolved.identity.clone(),
            known: self.state.cache.lookup_identity(&resolved.fingerprint),
        }
    }

    fn fresh(
        &self,
        request: &EnrichmentRequest,
        resolved: ResolvedIdentity,
        record: EnrichedRecord,
    ) -> EnrichmentResult {
        EnrichmentResult::new(
            request.id.clone(),
            resolved.fingerprint,
            &resolved.identity,
            record,
            Provenance::Fresh,
        )
    }
}

impl Drop for EnrichmentService {
    fn drop(&mut self) {
        for handle in &self.background {
            handle.abort();
        }
    }
}
