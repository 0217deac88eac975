//! Contact Enricher - enrichment orchestration for contact records.
//!
//! Resolves contacts to stable identity fingerprints, serves repeat lookups
//! from a TTL cache and sends misses to a metered provider in batches,
//! behind a spend governor, a circuit breaker and a retry policy.

pub mod cli;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod model;
#[cfg(test)]
pub mod test_utils;
