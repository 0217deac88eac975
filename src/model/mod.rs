//! Core data models for the contact store.
//!
//! Defines [`Contact`], derived from SQLx for database mapping.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `contacts` - Contacts with identity fields and merged enrichment JSON

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::enrichment::domain::{EnrichedRecord, EnrichmentRequest, RequestId};

/// A contact awaiting or holding enrichment.
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Contact {
    /// Caller-assigned id (unique)
    pub id: String,
    /// Person's full name
    pub full_name: Option<String>,
    /// Company the person works for
    pub organization: Option<String>,
    /// Company web domain
    pub domain: Option<String>,
    pub email: Option<String>,
    /// Merged provider data as JSON ([`EnrichedRecord`])
    #[serde(default)]
    pub enrichment: Option<String>,
    /// RFC 3339 timestamp of the last successful enrichment
    #[serde(default)]
    pub enriched_at: Option<String>,
}

impl Contact {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Identity fields as an enrichment request keyed by the contact id.
    pub fn to_request(&self) -> EnrichmentRequest {
        EnrichmentRequest {
            id: RequestId::new(self.id.as_str()),
            company_name: self.organization.clone(),
            domain: self.domain.clone(),
            person_name: self.full_name.clone(),
            email: self.email.clone(),
        }
    }

    /// Previously stored enrichment, if any and if it still parses.
    pub fn enrichment_record(&self) -> Option<EnrichedRecord> {
        let json = self.enrichment.as_deref()?;
        match serde_json::from_str(json) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(contact = %self.id, "Ignoring unreadable enrichment JSON: {}", e);
                None
            }
        }
    }
}
