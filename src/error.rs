//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the application.
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors (e.g., [`EnrichmentError`]) for detailed handling
//! - All errors implement `std::error::Error` for compatibility
//!
//! # Example
//!
//! ```ignore
//! use contact_enricher::error::{Result, ResultExt};
//!
//! async fn import(pool: &SqlitePool, path: &Path) -> Result<()> {
//!     let raw = std::fs::read_to_string(path).with_context("reading contacts file")?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! [`EnrichmentError`]: crate::enrichment::EnrichmentError

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::db::StoreError;
use crate::enrichment::{EnrichmentError, JobError};

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Contact store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Enrichment error
    #[error("Enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),

    /// Background job error
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Config file error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed input file
    #[error("Invalid input in {path}: {message}")]
    InvalidInput { path: PathBuf, message: String },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an invalid input error.
    pub fn invalid_input(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, StoreError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Store(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_display() {
        let err = Error::invalid_input("/tmp/requests.json", "expected an array");
        let msg = err.to_string();
        assert!(msg.contains("requests.json"));
        assert!(msg.contains("expected an array"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::from(EnrichmentError::NonResolvableIdentity).context("while enriching c1");
        let msg = err.to_string();
        assert!(msg.contains("while enriching c1"));
    }

    #[test]
    fn test_store_error_converts() {
        let err: Error = StoreError::NotFound("c9".into()).into();
        assert!(matches!(err, Error::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let with_ctx = result.with_context("opening input");
        assert!(with_ctx.unwrap_err().to_string().contains("opening input"));
    }
}
