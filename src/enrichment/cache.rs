//! In-memory enrichment cache.
//!
//! Caches provider results to avoid repeated (metered) network requests.
//! Keyed by identity [`Fingerprint`], with one slot per TTL class:
//! identity matches live long, full payloads expire sooner.
//!
//! Expiry is lazy: entries are checked at lookup time, so correctness never
//! depends on the optional background sweep.
//!
//! Writes are ordered by logical [`Ticket`]s. A caller takes a ticket before
//! dispatching a provider call and stores the result with it. An invalidation
//! leaves a tombstone carrying a newer ticket, so a store from a call that was
//! already in flight when the invalidation happened is discarded.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::domain::{EnrichedRecord, IdentityMatch, ResultKind};
use super::fingerprint::Fingerprint;

/// Cache TTLs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long identity matches stay valid
    pub identity_ttl: Duration,
    /// How long full enrichment payloads stay valid
    pub payload_ttl: Duration,
    /// How long invalidation tombstones are kept before the sweep drops them
    pub tombstone_retention: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            identity_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            payload_ttl: Duration::from_secs(24 * 60 * 60),
            tombstone_retention: Duration::from_secs(60 * 60),
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, kind: ResultKind) -> Duration {
        match kind {
            ResultKind::IdentityMatch => self.identity_ttl,
            ResultKind::FullPayload => self.payload_ttl,
        }
    }
}

/// Logical timestamp ordering stores against invalidations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

/// Value held in a cache slot.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Identity(IdentityMatch),
    Payload(EnrichedRecord),
}

impl CachedValue {
    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Identity(_) => ResultKind::IdentityMatch,
            Self::Payload(_) => ResultKind::FullPayload,
        }
    }
}

/// A cached provider result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: CachedValue,
    pub inserted_at: Instant,
    pub ttl: Duration,
    ticket: Ticket,
}

impl CacheEntry {
    pub fn kind(&self) -> ResultKind {
        self.value.kind()
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Debug, Clone, Copy)]
struct Tombstone {
    ticket: Ticket,
    at: Instant,
}

#[derive(Debug, Default)]
struct Slot {
    identity: Option<CacheEntry>,
    payload: Option<CacheEntry>,
    tombstone: Option<Tombstone>,
}

impl Slot {
    fn entry(&self, kind: ResultKind) -> Option<&CacheEntry> {
        match kind {
            ResultKind::IdentityMatch => self.identity.as_ref(),
            ResultKind::FullPayload => self.payload.as_ref(),
        }
    }

    fn entry_mut(&mut self, kind: ResultKind) -> &mut Option<CacheEntry> {
        match kind {
            ResultKind::IdentityMatch => &mut self.identity,
            ResultKind::FullPayload => &mut self.payload,
        }
    }

    fn is_vacant(&self) -> bool {
        self.identity.is_none() && self.payload.is_none() && self.tombstone.is_none()
    }
}

/// Cache counters for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Lookups that found an entry past its TTL
    pub stale: u64,
    pub stores: u64,
    /// Stores discarded because a newer write or invalidation won
    pub rejected_stores: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    stores: AtomicU64,
    rejected_stores: AtomicU64,
    invalidations: AtomicU64,
}

/// Enrichment result cache shared by all callers.
#[derive(Debug)]
pub struct EnrichmentCache {
    config: CacheConfig,
    clock: AtomicU64,
    slots: RwLock<HashMap<Fingerprint, Slot>>,
    counters: Counters,
}

impl EnrichmentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            clock: AtomicU64::new(1),
            slots: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Take a ticket for a write that will happen later.
    pub fn ticket(&self) -> Ticket {
        Ticket(self.clock.fetch_add(1, Ordering::SeqCst))
    }

    /// Look up a live entry. Never blocks on I/O.
    pub fn lookup(&self, fingerprint: &Fingerprint, kind: ResultKind) -> Option<CacheEntry> {
        let now = Instant::now();
        let slots = self.slots.read();

        match slots.get(fingerprint).and_then(|slot| slot.entry(kind)) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            Some(_) => {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Cached full payload, if live.
    pub fn lookup_payload(&self, fingerprint: &Fingerprint) -> Option<EnrichedRecord> {
        match self.lookup(fingerprint, ResultKind::FullPayload)?.value {
            CachedValue::Payload(record) => Some(record),
            CachedValue::Identity(_) => None,
        }
    }

    /// Cached identity match, if live.
    pub fn lookup_identity(&self, fingerprint: &Fingerprint) -> Option<IdentityMatch> {
        match self.lookup(fingerprint, ResultKind::IdentityMatch)?.value {
            CachedValue::Identity(identity) => Some(identity),
            CachedValue::Payload(_) => None,
        }
    }

    /// Store a value issued at `ticket`, using the TTL of its class.
    ///
    /// Returns `false` when the write lost to a later invalidation or a
    /// later store for the same slot.
    pub fn store(&self, fingerprint: &Fingerprint, value: CachedValue, ticket: Ticket) -> bool {
        let ttl = self.config.ttl_for(value.kind());
        self.store_with_ttl(fingerprint, value, ttl, ticket)
    }

    /// Store with an explicit TTL.
    pub fn store_with_ttl(
        &self,
        fingerprint: &Fingerprint,
        value: CachedValue,
        ttl: Duration,
        ticket: Ticket,
    ) -> bool {
        let kind = value.kind();
        let mut slots = self.slots.write();
        let slot = slots.entry(fingerprint.clone()).or_default();

        let invalidated_later = slot.tombstone.is_some_and(|t| t.ticket > ticket);
        let newer_entry = slot.entry(kind).is_some_and(|e| e.ticket > ticket);
        if invalidated_later || newer_entry {
            self.counters.rejected_stores.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%fingerprint, ?kind, "Discarding stale cache write");
            return false;
        }

        *slot.entry_mut(kind) = Some(CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl,
            ticket,
        });
        self.counters.stores.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Store both TTL classes for a fresh provider record.
    pub fn store_record(&self, fingerprint: &Fingerprint, record: &EnrichedRecord, ticket: Ticket) {
        if !record.identity.is_empty() {
            self.store(
                fingerprint,
                CachedValue::Identity(record.identity.clone()),
                ticket,
            );
        }
        self.store(fingerprint, CachedValue::Payload(record.clone()), ticket);
    }

    /// Drop both entries for a fingerprint and fence off older in-flight stores.
    pub fn invalidate(&self, fingerprint: &Fingerprint) {
        let ticket = self.ticket();
        let mut slots = self.slots.write();
        let slot = slots.entry(fingerprint.clone()).or_default();
        slot.identity = None;
        slot.payload = None;
        slot.tombstone = Some(Tombstone {
            ticket,
            at: Instant::now(),
        });
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%fingerprint, "Cache entry invalidated");
    }

    /// Reclaim expired entries and aged tombstones. Returns slots removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let retention = self.config.tombstone_retention;
        let mut slots = self.slots.write();
        let before = slots.len();

        slots.retain(|_, slot| {
            if slot.identity.as_ref().is_some_and(|e| e.is_expired_at(now)) {
                slot.identity = None;
            }
            if slot.payload.as_ref().is_some_and(|e| e.is_expired_at(now)) {
                slot.payload = None;
            }
            if slot
                .tombstone
                .is_some_and(|t| now.duration_since(t.at) >= retention)
            {
                slot.tombstone = None;
            }
            !slot.is_vacant()
        });

        before - slots.len()
    }

    /// Run [`sweep`](Self::sweep) periodically until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired cache entries");
                }
            }
        })
    }

    /// Number of fingerprints with any cached state.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stale: self.counters.stale.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            rejected_stores: self.counters.rejected_stores.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl Default for EnrichmentCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
