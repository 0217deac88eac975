//! Explorium HTTP client
//!
//! Handles communication with the Explorium business and prospect data API.
//! See: https://developers.explorium.ai/reference
//!
//! ## Call sequence for a batch
//!
//! 1. `POST /v1/businesses/match` for queries without a cached business id
//! 2. firmographics, technographics and workforce trends `bulk_enrich` for every business id
//! 3. `POST /v1/prospects/match` for queries naming a person without a cached prospect id
//! 4. profiles + contact information `bulk_enrich` for every prospect id
//!
//! Steps that have nothing to send are skipped, so a fully known batch costs
//! only the enrichment calls.
//!
//! ## Errors
//!
//! Any failure in the business steps fails the whole call. In the prospect
//! steps only transient failures do; a permanent one (e.g. the plan does not
//! include prospect data) is logged and the batch returns business data only,
//! which callers see as a partial result.
//!
//! Authentication uses the `api_key` header.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{adapter, dto};
use crate::enrichment::domain::{
    BusinessProfile, IdentityMatch, ProspectProfile, ProviderError, ProviderQuery, ProviderReply,
};

/// Name used for spend ledgers and the circuit breaker
pub const PROVIDER_NAME: &str = "explorium";

pub const DEFAULT_BASE_URL: &str = "https://api.explorium.ai";

/// Explorium API client
pub struct ExploriumClient {
    name: String,
    api_key: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl ExploriumClient {
    /// Create a new client with the given API key
    ///
    /// The client is configured to:
    /// - Accept gzip-compressed responses (reduces bandwidth)
    /// - Send User-Agent header identifying the application
    /// - Abort any single request after `timeout`
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| ProviderError::Connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: PROVIDER_NAME.to_string(),
            api_key: api_key.into(),
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Report under another provider name, e.g. to keep separate ledgers per account.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Enrich a batch of queries (see module docs for the call sequence).
    pub async fn enrich_batch(
        &self,
        queries: &[ProviderQuery],
    ) -> Result<ProviderReply, ProviderError> {
        if queries.is_empty() {
            return Ok(ProviderReply::new());
        }

        let mut ids: Vec<IdentityMatch> = queries
            .iter()
            .map(|q| q.known.clone().unwrap_or_default())
            .collect();

        self.resolve_businesses(queries, &mut ids).await?;
        let business_ids = unique(ids.iter().filter_map(|i| i.business_id.as_deref()));
        let businesses = self.enrich_businesses(business_ids).await?;

        let prospects = match self.resolve_and_enrich_prospects(queries, &mut ids).await {
            Ok(prospects) => prospects,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                tracing::warn!("Prospect lookup failed, returning business data only: {}", e);
                for (query, id) in queries.iter().zip(ids.iter_mut()) {
                    // Keep ids the caller already had
                    if query.known.as_ref().and_then(|k| k.prospect_id.as_ref()).is_none() {
                        id.prospect_id = None;
                    }
                }
                HashMap::new()
            }
        };

        Ok(adapter::assemble(queries, &ids, &businesses, &prospects))
    }

    async fn resolve_businesses(
        &self,
        queries: &[ProviderQuery],
        ids: &mut [IdentityMatch],
    ) -> Result<(), ProviderError> {
        let pending: Vec<usize> = (0..queries.len())
            .filter(|&i| ids[i].business_id.is_none())
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let body = dto::MatchBusinessesRequest {
            businesses_to_match: pending
                .iter()
                .map(|&i| adapter::business_match_input(&queries[i].identity))
                .collect(),
        };
        let response: dto::MatchBusinessesResponse =
            self.post("/v1/businesses/match", &body).await?;

        let matched = adapter::business_ids(response, pending.len());
        for (&i, business_id) in pending.iter().zip(matched) {
            ids[i].business_id = business_id;
        }
        Ok(())
    }

    async fn enrich_businesses(
        &self,
        business_ids: Vec<String>,
    ) -> Result<HashMap<String, BusinessProfile>, ProviderError> {
        if business_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let body = dto::BusinessIdsRequest { business_ids };

        let (firmographics, technographics, workforce) = tokio::try_join!(
            self.post::<_, dto::BulkEnrichResponse<dto::FirmographicsEntry>>(
                "/v1/businesses/firmographics/bulk_enrich",
                &body
            ),
            self.post::<_, dto::BulkEnrichResponse<dto::TechnographicsEntry>>(
                "/v1/businesses/technographics/bulk_enrich",
                &body
            ),
            self.post::<_, dto::BulkEnrichResponse<dto::WorkforceTrendsEntry>>(
                "/v1/businesses/workforce_trends/bulk_enrich",
                &body
            ),
        )?;

        Ok(adapter::business_profiles(
            firmographics.data,
            technographics.data,
            workforce.data,
        ))
    }

    async fn resolve_and_enrich_prospects(
        &self,
        queries: &[ProviderQuery],
        ids: &mut [IdentityMatch],
    ) -> Result<HashMap<String, ProspectProfile>, ProviderError> {
        let pending: Vec<usize> = (0..queries.len())
            .filter(|&i| queries[i].identity.wants_prospect() && ids[i].prospect_id.is_none())
            .collect();

        if !pending.is_empty() {
            let body = dto::MatchProspectsRequest {
                prospects_to_match: pending
                    .iter()
                    .map(|&i| {
                        adapter::prospect_match_input(
                            &queries[i].identity,
                            ids[i].business_id.as_deref(),
                        )
                    })
                    .collect(),
            };
            let response: dto::MatchProspectsResponse =
                self.post("/v1/prospects/match", &body).await?;

            let matched = adapter::prospect_ids(response, pending.len());
            for (&i, prospect_id) in pending.iter().zip(matched) {
                ids[i].prospect_id = prospect_id;
            }
        }

        let prospect_ids = unique(ids.iter().filter_map(|i| i.prospect_id.as_deref()));
        if prospect_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let body = dto::ProspectIdsRequest { prospect_ids };

        let (profiles, contacts) = tokio::try_join!(
            self.post::<_, dto::BulkEnrichResponse<dto::ProfileEntry>>(
                "/v1/prospects/profiles/bulk_enrich",
                &body
            ),
            self.post::<_, dto::BulkEnrichResponse<dto::ContactsEntry>>(
                "/v1/prospects/contacts_information/bulk_enrich",
                &body
            ),
        )?;

        Ok(adapter::prospect_profiles(profiles.data, contacts.data))
    }

    /// Send a JSON POST and parse the response
    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "Explorium request");

        let response = self
            .http_client
            .post(&url)
            .header("api_key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            // Try to get the response body for more details
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                format!(
                    "{} - {}",
                    status.canonical_reason().unwrap_or("Unknown"),
                    body.chars().take(200).collect::<String>()
                ),
            ));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_builder() {
        ProviderError::Validation(err.to_string())
    } else {
        ProviderError::Connection(err.to_string())
    }
}

/// Distinct ids in first-seen order
fn unique<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: Real integration tests would need a mock HTTP server.
    // These are unit tests for the client structure.

    #[test]
    fn test_client_creation() {
        let client =
            ExploriumClient::new("test-key", DEFAULT_BASE_URL, Duration::from_secs(5)).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url(), "https://api.explorium.ai");
        assert_eq!(client.name(), PROVIDER_NAME);
    }

    #[test]
    fn test_with_name() {
        let client = ExploriumClient::new("key", DEFAULT_BASE_URL, Duration::from_secs(5))
            .unwrap()
            .with_name("explorium-eu");
        assert_eq!(client.name(), "explorium-eu");
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client =
            ExploriumClient::new("key", "http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_unique_keeps_first_seen_order() {
        let ids = ["b2", "b1", "b2", "b3", "b1"];
        assert_eq!(unique(ids.into_iter()), vec!["b2", "b1", "b3"]);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_requests() {
        // Unroutable base URL: any request would fail
        let client =
            ExploriumClient::new("key", "http://127.0.0.1:9", Duration::from_millis(100)).unwrap();
        assert!(client.enrich_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let client =
            ExploriumClient::new("key", "http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let resolved = crate::enrichment::fingerprint::resolve(
            &crate::enrichment::domain::EnrichmentRequest::new("r").company("Acme"),
        )
        .unwrap();
        let query = ProviderQuery {
            fingerprint: resolved.fingerprint,
            identity: resolved.identity,
            known: None,
        };

        let err = client.enrich_batch(&[query]).await.unwrap_err();
        assert!(err.is_transient(), "expected transient error, got {err:?}");
    }
}
