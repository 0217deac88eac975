//! Explorium API Data Transfer Objects
//!
//! These types match EXACTLY what the Explorium API sends and returns.
//! DO NOT add fields that aren't in the API payloads.
//! DO NOT use these types outside the explorium module - convert to domain types.
//!
//! API Reference: https://developers.explorium.ai/reference
//!
//! Example match response:
//! ```json
//! {
//!   "total_matches": 1,
//!   "matched_businesses": [
//!     {"input": {"name": "acme", "domain": "acme.com"}, "business_id": "8adce3ca1cef0c986b22310e369a0793"}
//!   ]
//! }
//! ```
//!
//! Example bulk enrich response:
//! ```json
//! {
//!   "response_context": {"correlation_id": "...", "request_status": "success"},
//!   "data": [
//!     {"business_id": "8adce3ca...", "data": {"name": "Acme", "website": "https://acme.com"}}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST /v1/businesses/match`
#[derive(Debug, Clone, Serialize)]
pub struct MatchBusinessesRequest {
    pub businesses_to_match: Vec<BusinessMatchInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessMatchInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Body of `POST /v1/prospects/match`
#[derive(Debug, Clone, Serialize)]
pub struct MatchProspectsRequest {
    pub prospects_to_match: Vec<ProspectMatchInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProspectMatchInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Narrows matching to one company
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
}

/// Body of the business `bulk_enrich` endpoints
#[derive(Debug, Clone, Serialize)]
pub struct BusinessIdsRequest {
    pub business_ids: Vec<String>,
}

/// Body of the prospect `bulk_enrich` endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ProspectIdsRequest {
    pub prospect_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Response of `POST /v1/businesses/match`
///
/// `matched_businesses` is positional: entry `i` answers input `i`.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchBusinessesResponse {
    #[serde(default)]
    pub matched_businesses: Vec<MatchedBusiness>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchedBusiness {
    /// Null when the input could not be matched
    pub business_id: Option<String>,
}

/// Response of `POST /v1/prospects/match`, positional like the business match
#[derive(Debug, Clone, Deserialize)]
pub struct MatchProspectsResponse {
    #[serde(default)]
    pub matched_prospects: Vec<MatchedProspect>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchedProspect {
    pub prospect_id: Option<String>,
}

/// Envelope shared by every `bulk_enrich` endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct BulkEnrichResponse<T> {
    #[serde(default)]
    pub data: Vec<T>,
}

/// One entry of `/v1/businesses/firmographics/bulk_enrich`
#[derive(Debug, Clone, Deserialize)]
pub struct FirmographicsEntry {
    pub business_id: String,
    pub data: Option<Firmographics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Firmographics {
    pub name: Option<String>,
    pub website: Option<String>,
    pub country_name: Option<String>,
    pub city_name: Option<String>,
    /// e.g. "51-200"
    pub number_of_employees_range: Option<String>,
    /// e.g. "10M-25M"
    pub yearly_revenue_range: Option<String>,
    pub linkedin_industry_category: Option<String>,
    pub linkedin_profile: Option<String>,
}

/// One entry of `/v1/businesses/technographics/bulk_enrich`
#[derive(Debug, Clone, Deserialize)]
pub struct TechnographicsEntry {
    pub business_id: String,
    pub data: Option<Technographics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Technographics {
    #[serde(default)]
    pub full_tech_stack: Vec<String>,
}

/// One entry of `/v1/businesses/workforce_trends/bulk_enrich`
#[derive(Debug, Clone, Deserialize)]
pub struct WorkforceTrendsEntry {
    pub business_id: String,
    pub data: Option<WorkforceTrends>,
}

/// Percent of employee profiles per department
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkforceTrends {
    pub perc_engineering_roles: Option<f64>,
    pub perc_sales_roles: Option<f64>,
    pub perc_marketing_roles: Option<f64>,
    pub perc_operations_roles: Option<f64>,
    pub perc_finance_roles: Option<f64>,
    pub perc_human_resources_roles: Option<f64>,
    pub profiles_found: Option<u64>,
}

/// One entry of `/v1/prospects/profiles/bulk_enrich`
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileEntry {
    pub prospect_id: String,
    pub data: Option<ProspectProfileData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProspectProfileData {
    pub full_name: Option<String>,
    pub job_title: Option<String>,
    pub job_level_main: Option<String>,
    pub job_department_main: Option<String>,
    pub country_name: Option<String>,
    pub linkedin: Option<String>,
}

/// One entry of `/v1/prospects/contacts_information/bulk_enrich`
#[derive(Debug, Clone, Deserialize)]
pub struct ContactsEntry {
    pub prospect_id: String,
    pub data: Option<ContactInformation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInformation {
    /// Sic: the API spells it this way
    pub professions_email: Option<String>,
    pub mobile_phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Contract test: ensure we can parse a real business match response
    #[test]
    fn test_parse_business_match_response() {
        let json = r#"{
            "total_matches": 1,
            "matched_businesses": [
                {"input": {"name": "acme", "domain": "acme.com"}, "business_id": "8adce3ca1cef0c986b22310e369a0793"},
                {"input": {"name": "nobody"}, "business_id": null}
            ]
        }"#;

        let response: MatchBusinessesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.matched_businesses.len(), 2);
        assert_eq!(
            response.matched_businesses[0].business_id.as_deref(),
            Some("8adce3ca1cef0c986b22310e369a0793")
        );
        assert!(response.matched_businesses[1].business_id.is_none());
    }

    #[test]
    fn test_parse_firmographics_response() {
        let json = r#"{
            "response_context": {"correlation_id": "abc", "request_status": "success", "time_took_in_seconds": 0.4},
            "data": [{
                "business_id": "8adce3ca",
                "data": {
                    "name": "Acme",
                    "website": "https://acme.com",
                    "country_name": "united states",
                    "city_name": "denver",
                    "number_of_employees_range": "51-200",
                    "yearly_revenue_range": "10M-25M",
                    "linkedin_industry_category": "software development",
                    "linkedin_profile": "https://www.linkedin.com/company/acme",
                    "naics": 511210
                }
            }]
        }"#;

        let response: BulkEnrichResponse<FirmographicsEntry> = serde_json::from_str(json).unwrap();
        let firmo = response.data[0].data.as_ref().unwrap();
        assert_eq!(firmo.name.as_deref(), Some("Acme"));
        assert_eq!(firmo.number_of_employees_range.as_deref(), Some("51-200"));
    }

    #[test]
    fn test_parse_technographics_with_missing_stack() {
        let json = r#"{"data": [{"business_id": "b1", "data": {}}, {"business_id": "b2", "data": null}]}"#;
        let response: BulkEnrichResponse<TechnographicsEntry> = serde_json::from_str(json).unwrap();
        assert!(response.data[0].data.as_ref().unwrap().full_tech_stack.is_empty());
        assert!(response.data[1].data.is_none());
    }

    #[test]
    fn test_parse_workforce_trends_response() {
        let json = r#"{
            "response_context": {"request_status": "success"},
            "data": [{
                "business_id": "8adce3ca",
                "data": {
                    "perc_engineering_roles": 41.5,
                    "perc_sales_roles": 12.0,
                    "profiles_found": 180,
                    "quarter_partition_date": "2025-Q1"
                }
            }]
        }"#;

        let response: BulkEnrichResponse<WorkforceTrendsEntry> =
            serde_json::from_str(json).unwrap();
        let trends = response.data[0].data.as_ref().unwrap();
        assert_eq!(trends.perc_engineering_roles, Some(41.5));
        assert_eq!(trends.profiles_found, Some(180));
        assert!(trends.perc_marketing_roles.is_none());
    }

    #[test]
    fn test_parse_prospect_responses() {
        let matched: MatchProspectsResponse = serde_json::from_str(
            r#"{"matched_prospects": [{"input": {"full_name": "jane doe"}, "prospect_id": "p1"}]}"#,
        )
        .unwrap();
        assert_eq!(matched.matched_prospects[0].prospect_id.as_deref(), Some("p1"));

        let contacts: BulkEnrichResponse<ContactsEntry> = serde_json::from_str(
            r#"{"data": [{"prospect_id": "p1", "data": {"professions_email": "jane@acme.com", "emails": []}}]}"#,
        )
        .unwrap();
        assert_eq!(
            contacts.data[0].data.as_ref().unwrap().professions_email.as_deref(),
            Some("jane@acme.com")
        );
    }

    #[test]
    fn test_empty_envelope() {
        let response: BulkEnrichResponse<ProfileEntry> = serde_json::from_str("{}").unwrap();
        assert!(response.data.is_empty());
    }

    #[test]
    fn test_match_input_omits_missing_fields() {
        let body = MatchBusinessesRequest {
            businesses_to_match: vec![BusinessMatchInput {
                name: Some("acme".into()),
                domain: None,
            }],
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"businesses_to_match":[{"name":"acme"}]}"#
        );
    }
}
