//! Background enrichment workers.
//!
//! A bounded job queue feeds a fixed pool of workers. Each job loads a
//! contact from the [`ContactStore`], runs it through the shared
//! [`EnrichmentService`] and saves the enriched fields back. The outcome is
//! delivered on a oneshot channel returned at submission.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::domain::{EnrichmentError, EnrichmentResult};
use super::service::EnrichmentService;
use super::traits::ContactStore;
use crate::db::StoreError;

/// Job failures
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Contact store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),

    #[error("Worker pool is shut down")]
    Shutdown,
}

pub type JobResult = Result<EnrichmentResult, JobError>;

struct Job {
    contact_id: String,
    reply: oneshot::Sender<JobResult>,
}

/// Pool of enrichment workers sharing one queue.
pub struct EnrichmentWorkers {
    tx: mpsc::Sender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl EnrichmentWorkers {
    /// Start `workers` workers behind a queue holding `queue_depth` jobs.
    pub fn spawn(
        service: Arc<EnrichmentService>,
        store: Arc<dyn ContactStore>,
        workers: usize,
        queue_depth: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let (rx, service, store) = (rx.clone(), service.clone(), store.clone());
                tokio::spawn(async move {
                    loop {
                        // Hold the lock only while waiting for the next job
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };

                        tracing::debug!(
                            worker,
                            contact = %job.contact_id,
                            "Processing enrichment job"
                        );
                        let outcome = process(&service, store.as_ref(), &job.contact_id).await;
                        if let Err(e) = &outcome {
                            tracing::warn!(
                                worker,
                                contact = %job.contact_id,
                                "Enrichment job failed: {}",
                                e
                            );
                        }
                        let _ = job.reply.send(outcome);
                    }
                    tracing::debug!(worker, "Worker stopped");
                })
            })
            .collect();

        Self { tx, handles }
    }

    /// Queue a contact; waits for queue space.
    pub async fn submit(
        &self,
        contact_id: impl Into<String>,
    ) -> Result<oneshot::Receiver<JobResult>, JobError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job {
                contact_id: contact_id.into(),
                reply,
            })
            .await
            .map_err(|_| JobError::Shutdown)?;
        Ok(rx)
    }

    /// Queue a contact and wait for its outcome.
    pub async fn enrich(&self, contact_id: impl Into<String>) -> JobResult {
        let rx = self.submit(contact_id).await?;
        rx.await.map_err(|_| JobError::Shutdown)?
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn process(
    service: &EnrichmentService,
    store: &dyn ContactStore,
    contact_id: &str,
) -> JobResult {
    let contact = store.get_contact(contact_id).await?;
    let result = service.enrich_one(&contact.to_request()).await?;
    store.save_enriched_fields(contact_id, &result.record).await?;
    Ok(result)
}
