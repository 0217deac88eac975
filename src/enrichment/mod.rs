//! Contact enrichment module - resolves identities and fetches company and
//! person data from a metered external provider.
//!
//! # Architecture
//!
//! This module follows a clean separation between:
//! - **Domain models** (`domain.rs`) - Internal types that represent our business logic
//! - **API DTOs** (`explorium/dto.rs`) - Exact API payload shapes
//! - **Adapters** - Convert DTOs to domain models
//! - **Clients** - HTTP clients for external APIs
//! - **Fingerprint** - Identity normalization and cache keys
//! - **Guards** (`governor.rs`, `circuit.rs`, `retry.rs`) - Composed around the
//!   provider in `pipeline.rs`
//! - **Service** - High-level orchestration of the enrichment flow
//!
//! This decoupling means:
//! 1. API changes don't ripple through our codebase
//! 2. We can test API contracts independently
//! 3. We can swap providers without changing business logic
//!
//! # Usage
//!
//! ```ignore
//! use contact_enricher::enrichment::{
//!     EnrichmentConfig, EnrichmentRequest, EnrichmentService, ExploriumClient,
//! };
//!
//! let client = ExploriumClient::new(api_key, DEFAULT_BASE_URL, Duration::from_secs(15))?;
//! let service = EnrichmentService::new(EnrichmentConfig::default(), Arc::new(client))?;
//!
//! let request = EnrichmentRequest::new("c1").company("Acme Inc.").domain("acme.com");
//! let result = service.enrich_one(&request).await?;
//! println!("{:?} ({:?})", result.record.business, result.provenance);
//! ```

pub mod batch;
pub mod cache;
pub mod circuit;
pub mod domain;
pub mod explorium;
pub mod fingerprint;
pub mod governor;
pub mod pipeline;
pub mod retry;
pub mod service;
pub mod traits;
pub mod worker;

pub use domain::{
    EnrichedRecord, EnrichmentError, EnrichmentRequest, EnrichmentResult, ErrorKind, Provenance,
    RequestId,
};
pub use explorium::ExploriumClient;
pub use service::{EnrichmentConfig, EnrichmentService, ServiceStatus};
pub use traits::{ContactStore, EnrichmentProvider};
pub use worker::{EnrichmentWorkers, JobError};
