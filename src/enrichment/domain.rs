//! Internal domain models for contact enrichment.
//!
//! These types are OUR types - they don't change when the provider's API changes.
//! All provider responses get converted into these types via adapters.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;

/// Caller-assigned identifier for one enrichment request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity fields of a contact that needs enrichment.
///
/// Immutable once issued; the orchestrator only ever borrows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    pub id: RequestId,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub person_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl EnrichmentRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(id),
            ..Default::default()
        }
    }

    pub fn company(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn person(mut self, name: impl Into<String>) -> Self {
        self.person_name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Identity fields after normalization. Produced by the fingerprint resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NormalizedIdentity {
    pub company: Option<String>,
    pub domain: Option<String>,
    pub person: Option<String>,
    pub email: Option<String>,
}

impl NormalizedIdentity {
    /// Whether the caller asked for person-level data.
    pub fn wants_prospect(&self) -> bool {
        self.person.is_some() || self.email.is_some()
    }
}

/// TTL class of a cached result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// Provider ids resolved for an identity. Stable, long-lived.
    IdentityMatch,
    /// Full enrichment payload. Changes more often, short-lived.
    FullPayload,
}

/// Provider-side ids an identity resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMatch {
    pub business_id: Option<String>,
    pub prospect_id: Option<String>,
}

impl IdentityMatch {
    pub fn is_empty(&self) -> bool {
        self.business_id.is_none() && self.prospect_id.is_none()
    }
}

/// Company-level data (firmographics, technographics and workforce trends)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub name: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub employee_range: Option<String>,
    pub revenue_range: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub workforce: Option<WorkforceTrends>,
}

/// Share of a company's employees per department, in percent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkforceTrends {
    pub engineering: Option<f64>,
    pub sales: Option<f64>,
    pub marketing: Option<f64>,
    pub operations: Option<f64>,
    pub finance: Option<f64>,
    pub human_resources: Option<f64>,
    /// Employee profiles the shares were computed from
    pub profiles_counted: Option<u64>,
}

/// Person-level data (profile and contact information)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProspectProfile {
    pub full_name: Option<String>,
    pub job_title: Option<String>,
    pub job_level: Option<String>,
    pub department: Option<String>,
    pub professional_email: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub country: Option<String>,
}

/// Normalized provider output for one identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(default)]
    pub identity: IdentityMatch,
    pub business: Option<BusinessProfile>,
    pub prospect: Option<ProspectProfile>,
}

impl EnrichedRecord {
    /// True when the provider matched but returned no data at all.
    pub fn is_empty(&self) -> bool {
        self.business.is_none() && self.prospect.is_none()
    }

    /// Merge another record into this one, preferring values already present
    pub fn merge(&mut self, other: &EnrichedRecord) {
        if self.identity.business_id.is_none() {
            self.identity.business_id = other.identity.business_id.clone();
        }
        if self.identity.prospect_id.is_none() {
            self.identity.prospect_id = other.identity.prospect_id.clone();
        }
        match (&mut self.business, &other.business) {
            (Some(mine), Some(theirs)) => mine.merge(theirs),
            (None, Some(theirs)) => self.business = Some(theirs.clone()),
            _ => {}
        }
        match (&mut self.prospect, &other.prospect) {
            (Some(mine), Some(theirs)) => mine.merge(theirs),
            (None, Some(theirs)) => self.prospect = Some(theirs.clone()),
            _ => {}
        }
    }
}

fn fill(slot: &mut Option<String>, other: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(other);
    }
}

impl BusinessProfile {
    pub fn merge(&mut self, other: &BusinessProfile) {
        fill(&mut self.name, &other.name);
        fill(&mut self.website, &other.website);
        fill(&mut self.industry, &other.industry);
        fill(&mut self.employee_range, &other.employee_range);
        fill(&mut self.revenue_range, &other.revenue_range);
        fill(&mut self.country, &other.country);
        fill(&mut self.city, &other.city);
        fill(&mut self.linkedin_url, &other.linkedin_url);
        if self.technologies.is_empty() {
            self.technologies = other.technologies.clone();
        }
        if self.workforce.is_none() {
            self.workforce.clone_from(&other.workforce);
        }
    }
}

impl ProspectProfile {
    pub fn merge(&mut self, other: &ProspectProfile) {
        fill(&mut self.full_name, &other.full_name);
        fill(&mut self.job_title, &other.job_title);
        fill(&mut self.job_level, &other.job_level);
        fill(&mut self.department, &other.department);
        fill(&mut self.professional_email, &other.professional_email);
        fill(&mut self.phone, &other.phone);
        fill(&mut self.linkedin_url, &other.linkedin_url);
        fill(&mut self.country, &other.country);
    }
}

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Fresh,
    Cached,
}

/// Section of an enrichment that could not be obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSection {
    Business,
    Prospect,
}

/// Result handed back to callers of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentResult {
    pub request_id: RequestId,
    pub fingerprint: Fingerprint,
    pub record: EnrichedRecord,
    pub provenance: Provenance,
    /// Some requested sections were unavailable; see `missing`.
    pub partial: bool,
    pub missing: Vec<MissingSection>,
}

impl EnrichmentResult {
    pub fn new(
        request_id: RequestId,
        fingerprint: Fingerprint,
        identity: &NormalizedIdentity,
        record: EnrichedRecord,
        provenance: Provenance,
    ) -> Self {
        let mut missing = Vec::new();
        let has_business_anchor = identity.company.is_some() || identity.domain.is_some();
        if has_business_anchor && record.business.is_none() {
            missing.push(MissingSection::Business);
        }
        if identity.wants_prospect() && record.prospect.is_none() {
            missing.push(MissingSection::Prospect);
        }

        Self {
            request_id,
            fingerprint,
            record,
            provenance,
            partial: !missing.is_empty(),
            missing,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.provenance == Provenance::Cached
    }
}

/// One identity sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderQuery {
    pub fingerprint: Fingerprint,
    pub identity: NormalizedIdentity,
    /// Ids already resolved (from the identity cache); lets the provider skip matching.
    pub known: Option<IdentityMatch>,
}

/// Provider answer for a batch, keyed by the fingerprint of each query.
///
/// A query without an entry was not matched.
pub type ProviderReply = HashMap<Fingerprint, Result<EnrichedRecord, ProviderError>>;

/// Raw failure classification for a provider call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request rejected by provider: {0}")]
    Validation(String),

    #[error("No match found")]
    NotFound,

    #[error("Failed to parse provider response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Errors worth retrying: the same request may succeed a moment later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Server { .. } | Self::Connection(_) | Self::RateLimited
        )
    }

    /// Classify an HTTP status into a provider error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth(message),
            404 => Self::NotFound,
            408 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::Server { status, message },
            _ => Self::Validation(format!("HTTP {status}: {message}")),
        }
    }
}

/// Taxonomy kind carried by every error crossing the orchestrator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before any provider interaction; not retried.
    Input,
    /// Capacity guard rejected the call; safe to retry later.
    Capacity,
    /// Provider failed transiently and internal retries ran out.
    Transient,
    /// Provider rejected the request for good.
    Permanent,
}

/// Errors surfaced by the enrichment orchestrator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnrichmentError {
    #[error("Identity is not resolvable: a company name or domain is required")]
    NonResolvableIdentity,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Daily spend cap for {provider} exceeded ({spent}/{cap} credits)")]
    DailyCapExceeded { provider: String, spent: u64, cap: u64 },

    #[error("Monthly spend cap for {provider} exceeded ({spent}/{cap} credits)")]
    MonthlyCapExceeded { provider: String, spent: u64, cap: u64 },

    #[error("Request rate for {provider} exceeded ({limit}/min)")]
    RequestRateExceeded { provider: String, limit: u32 },

    #[error("Circuit open for {provider} - failing fast")]
    CircuitOpen { provider: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ProviderError },

    #[error("Provider has no match for this identity")]
    ProviderNotFound,

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Timed out waiting for enrichment")]
    TimedOut,

    #[error("Enrichment unavailable: {0}")]
    Unavailable(String),
}

impl EnrichmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NonResolvableIdentity | Self::InvalidConfig(_) => ErrorKind::Input,
            Self::DailyCapExceeded { .. }
            | Self::MonthlyCapExceeded { .. }
            | Self::RequestRateExceeded { .. }
            | Self::CircuitOpen { .. }
            | Self::Unavailable(_) => ErrorKind::Capacity,
            Self::RetriesExhausted { .. } | Self::TimedOut => ErrorKind::Transient,
            Self::ProviderNotFound => ErrorKind::Permanent,
            Self::Provider(e) if e.is_transient() => ErrorKind::Transient,
            Self::Provider(_) => ErrorKind::Permanent,
        }
    }

    /// Stable machine-readable code for API layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NonResolvableIdentity => "non_resolvable_identity",
            Self::InvalidConfig(_) => "invalid_config",
            Self::DailyCapExceeded { .. } => "daily_cap_exceeded",
            Self::MonthlyCapExceeded { .. } => "monthly_cap_exceeded",
            Self::RequestRateExceeded { .. } => "request_rate_exceeded",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::ProviderNotFound => "provider_not_found",
            Self::Provider(_) => "provider_error",
            Self::TimedOut => "timed_out",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// Whether this outcome says the provider itself is unhealthy.
    pub fn indicates_provider_failure(&self) -> bool {
        match self {
            Self::RetriesExhausted { .. } => true,
            Self::Provider(e) => e.is_transient() || matches!(e, ProviderError::Auth(_)),
            _ => false,
        }
    }
}

impl From<ProviderError> for EnrichmentError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound => Self::ProviderNotFound,
            other => Self::Provider(other),
        }
    }
}
