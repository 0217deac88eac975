//! Batch coordinator for cache-miss lookups.
//!
//! Pending lookups are collected for a short window (or until the batch is
//! full) and sent to the provider in a single guarded call. Lookups for the
//! same fingerprint within one window share a slot in the batch.
//!
//! Each waiter gets exactly its own slice of the reply: an omitted entry
//! resolves to `provider_not_found` for that lookup only, and per-entry
//! errors never fail the entries that succeeded.
//!
//! A waiter that stops waiting before dispatch (caller timeout) is dropped
//! from the batch. Once dispatched, the call runs to completion and its
//! results are cached even if every waiter has gone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::cache::EnrichmentCache;
use super::domain::{EnrichedRecord, EnrichmentError, ProviderQuery};
use super::fingerprint::Fingerprint;
use super::pipeline::GuardedProvider;

/// Queued lookups per batch slot before `submit` applies backpressure
const QUEUE_FACTOR: usize = 8;

type LookupResult = Result<EnrichedRecord, EnrichmentError>;

/// Batching parameters
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// How long the first lookup of a batch waits for company
    pub window: Duration,
    /// Distinct identities per provider call
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(50),
            max_batch_size: 25,
        }
    }
}

struct PendingLookup {
    query: ProviderQuery,
    reply: oneshot::Sender<LookupResult>,
}

/// One distinct identity in a forming batch and everyone waiting on it.
struct Slot {
    query: ProviderQuery,
    waiters: Vec<oneshot::Sender<LookupResult>>,
}

/// Handle for submitting lookups to the batching task.
#[derive(Clone)]
pub struct BatchCoordinator {
    tx: mpsc::Sender<PendingLookup>,
}

impl BatchCoordinator {
    /// Start the collector task.
    pub fn spawn(
        guarded: Arc<GuardedProvider>,
        cache: Arc<EnrichmentCache>,
        config: BatchConfig,
    ) -> (Self, JoinHandle<()>) {
        let capacity = config.max_batch_size.max(1) * QUEUE_FACTOR;
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(collect(rx, guarded, cache, config));
        (Self { tx }, handle)
    }

    /// Queue a lookup and wait for its slice of the batch reply.
    ///
    /// Dropping the returned future before dispatch withdraws the lookup.
    pub async fn submit(&self, query: ProviderQuery) -> LookupResult {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PendingLookup { query, reply })
            .await
            .map_err(|_| EnrichmentError::Unavailable("batch coordinator stopped".into()))?;
        rx.await
            .map_err(|_| EnrichmentError::Unavailable("batch dropped before completion".into()))?
    }
}

async fn collect(
    mut rx: mpsc::Receiver<PendingLookup>,
    guarded: Arc<GuardedProvider>,
    cache: Arc<EnrichmentCache>,
    config: BatchConfig,
) {
    let max = config.max_batch_size.max(1);

    while let Some(first) = rx.recv().await {
        let deadline = Instant::now() + config.window;
        let mut slots: Vec<Slot> = Vec::new();
        let mut index: HashMap<Fingerprint, usize> = HashMap::new();
        add(&mut slots, &mut index, first);

        while slots.len() < max {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(pending)) => add(&mut slots, &mut index, pending),
                // Window elapsed or every handle dropped
                Ok(None) | Err(_) => break,
            }
        }

        tokio::spawn(dispatch(slots, guarded.clone(), cache.clone()));
    }

    tracing::debug!("Batch coordinator stopped");
}

fn add(slots: &mut Vec<Slot>, index: &mut HashMap<Fingerprint, usize>, pending: PendingLookup) {
    match index.get(&pending.query.fingerprint) {
        Some(&i) => slots[i].waiters.push(pending.reply),
        None => {
            index.insert(pending.query.fingerprint.clone(), slots.len());
            slots.push(Slot {
                query: pending.query,
                waiters: vec![pending.reply],
            });
        }
    }
}

async fn dispatch(slots: Vec<Slot>, guarded: Arc<GuardedProvider>, cache: Arc<EnrichmentCache>) {
    let slots: Vec<Slot> = slots
        .into_iter()
        .filter_map(|mut slot| {
            slot.waiters.retain(|tx| !tx.is_closed());
            (!slot.waiters.is_empty()).then_some(slot)
        })
        .collect();

    if slots.is_empty() {
        tracing::debug!("Every waiter left before dispatch, skipping batch");
        return;
    }

    let queries: Vec<ProviderQuery> = slots.iter().map(|s| s.query.clone()).collect();
    tracing::info!(
        provider = guarded.provider_name(),
        size = queries.len(),
        "Dispatching provider batch"
    );

    match guarded.fetch_through(&cache, &queries).await {
        Ok(mut outcomes) => {
            let failed = outcomes.values().filter(|o| o.is_err()).count();
            if failed > 0 {
                tracing::warn!(failed, size = queries.len(), "Partial batch failure");
            }
            for slot in slots {
                let outcome = outcomes
                    .remove(&slot.query.fingerprint)
                    .unwrap_or(Err(EnrichmentError::ProviderNotFound));
                for tx in slot.waiters {
                    // The waiter may have timed out meanwhile
                    let _ = tx.send(outcome.clone());
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, size = queries.len(), "Provider batch failed");
            for tx in slots.into_iter().flat_map(|s| s.waiters) {
                let _ = tx.send(Err(err.clone()));
            }
        }
    }
}
