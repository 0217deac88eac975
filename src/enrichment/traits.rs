//! Trait definitions for external collaborators.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code uses the real Explorium client and SQLite contact store,
//! while tests substitute the in-memory implementations in [`mocks`].
//!
//! # Example
//!
//! ```ignore
//! use contact_enricher::enrichment::traits::EnrichmentProvider;
//!
//! // In production code:
//! async fn warm<P: EnrichmentProvider>(provider: &P, queries: &[ProviderQuery]) {
//!     let reply = provider.enrich(queries).await?;
//! }
//!
//! // In tests:
//! struct MockProvider { ... }
//! impl EnrichmentProvider for MockProvider { ... }
//! ```

use async_trait::async_trait;

use super::domain::{EnrichedRecord, ProviderError, ProviderQuery, ProviderReply};
use crate::db::{SqliteContactStore, StoreError};
use crate::model::Contact;

/// The single "call provider" primitive every guard wraps.
///
/// Implementations accept a batch of identities and answer with one entry per
/// matched fingerprint. Queries the provider could not match are simply absent
/// from the reply.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Stable provider name, used for spend ledgers and logs.
    fn name(&self) -> &str;

    /// Enrich a batch of identities.
    async fn enrich(&self, queries: &[ProviderQuery]) -> Result<ProviderReply, ProviderError>;
}

/// Source of contact identity fields and sink for enriched data.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn get_contact(&self, id: &str) -> Result<Contact, StoreError>;

    async fn save_enriched_fields(&self, id: &str, record: &EnrichedRecord)
    -> Result<(), StoreError>;
}

// Implement traits for real clients

#[async_trait]
impl EnrichmentProvider for super::explorium::ExploriumClient {
    fn name(&self) -> &str {
        super::explorium::ExploriumClient::name(self)
    }

    async fn enrich(&self, queries: &[ProviderQuery]) -> Result<ProviderReply, ProviderError> {
        self.enrich_batch(queries).await
    }
}

#[async_trait]
impl ContactStore for SqliteContactStore {
    async fn get_contact(&self, id: &str) -> Result<Contact, StoreError> {
        crate::db::get_contact(self.pool(), id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save_enriched_fields(
        &self,
        id: &str,
        record: &EnrichedRecord,
    ) -> Result<(), StoreError> {
        self.merge_enrichment(id, record).await
    }
}
