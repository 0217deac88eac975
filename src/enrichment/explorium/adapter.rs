//! Adapter layer: Convert Explorium DTOs to domain models
//!
//! This is the ONLY place where DTO types are converted to domain types.
//! This isolates API changes - if Explorium changes their payloads,
//! only this file and dto.rs need to change.

use std::collections::HashMap;

use super::dto;
use crate::enrichment::domain::{
    BusinessProfile, EnrichedRecord, IdentityMatch, NormalizedIdentity, ProspectProfile,
    ProviderQuery, ProviderReply, WorkforceTrends,
};

/// Match input for a business identity
pub fn business_match_input(identity: &NormalizedIdentity) -> dto::BusinessMatchInput {
    dto::BusinessMatchInput {
        name: identity.company.clone(),
        domain: identity.domain.clone(),
    }
}

/// Match input for a person identity, narrowed to a business when known
pub fn prospect_match_input(
    identity: &NormalizedIdentity,
    business_id: Option<&str>,
) -> dto::ProspectMatchInput {
    dto::ProspectMatchInput {
        full_name: identity.person.clone(),
        company_name: identity.company.clone(),
        email: identity.email.clone(),
        business_id: business_id.map(str::to_string),
    }
}

/// Positional match ids, padded with `None` if the response came back short.
pub fn business_ids(response: dto::MatchBusinessesResponse, inputs: usize) -> Vec<Option<String>> {
    let mut ids: Vec<Option<String>> = response
        .matched_businesses
        .into_iter()
        .map(|m| m.business_id.filter(|id| !id.is_empty()))
        .collect();
    ids.resize(inputs, None);
    ids
}

pub fn prospect_ids(response: dto::MatchProspectsResponse, inputs: usize) -> Vec<Option<String>> {
    let mut ids: Vec<Option<String>> = response
        .matched_prospects
        .into_iter()
        .map(|m| m.prospect_id.filter(|id| !id.is_empty()))
        .collect();
    ids.resize(inputs, None);
    ids
}

/// Join firmographics, technographics and workforce trends by business id.
pub fn business_profiles(
    firmographics: Vec<dto::FirmographicsEntry>,
    technographics: Vec<dto::TechnographicsEntry>,
    workforce: Vec<dto::WorkforceTrendsEntry>,
) -> HashMap<String, BusinessProfile> {
    let mut profiles: HashMap<String, BusinessProfile> = firmographics
        .into_iter()
        .filter_map(|entry| Some((entry.business_id, to_business(entry.data?))))
        .collect();

    for entry in technographics {
        let Some(data) = entry.data else { continue };
        if data.full_tech_stack.is_empty() {
            continue;
        }
        profiles.entry(entry.business_id).or_default().technologies = data.full_tech_stack;
    }

    for entry in workforce {
        let Some(data) = entry.data else { continue };
        let trends = to_workforce(data);
        if trends == WorkforceTrends::default() {
            continue;
        }
        profiles.entry(entry.business_id).or_default().workforce = Some(trends);
    }
    profiles
}

fn to_workforce(data: dto::WorkforceTrends) -> WorkforceTrends {
    WorkforceTrends {
        engineering: data.perc_engineering_roles,
        sales: data.perc_sales_roles,
        marketing: data.perc_marketing_roles,
        operations: data.perc_operations_roles,
        finance: data.perc_finance_roles,
        human_resources: data.perc_human_resources_roles,
        profiles_counted: data.profiles_found,
    }
}

fn to_business(data: dto::Firmographics) -> BusinessProfile {
    BusinessProfile {
        name: data.name,
        website: data.website,
        industry: data.linkedin_industry_category,
        employee_range: data.number_of_employees_range,
        revenue_range: data.yearly_revenue_range,
        country: data.country_name,
        city: data.city_name,
        linkedin_url: data.linkedin_profile,
        technologies: Vec::new(),
        workforce: None,
    }
}

/// Join profile and contact information by prospect id.
pub fn prospect_profiles(
    profiles: Vec<dto::ProfileEntry>,
    contacts: Vec<dto::ContactsEntry>,
) -> HashMap<String, ProspectProfile> {
    let mut out: HashMap<String, ProspectProfile> = profiles
        .into_iter()
        .filter_map(|entry| {
            let data = entry.data?;
            Some((
                entry.prospect_id,
                ProspectProfile {
                    full_name: data.full_name,
                    job_title: data.job_title,
                    job_level: data.job_level_main,
                    department: data.job_department_main,
                    linkedin_url: data.linkedin,
                    country: data.country_name,
                    ..Default::default()
                },
            ))
        })
        .collect();

    for entry in contacts {
        let Some(data) = entry.data else { continue };
        let profile = out.entry(entry.prospect_id).or_default();
        profile.professional_email = data.professions_email;
        profile.phone = data.mobile_phone;
    }
    out
}

/// Build one reply entry per matched query.
///
/// `ids[i]` holds the resolved ids of `queries[i]`. Queries that matched
/// neither a business nor a prospect get no entry.
pub fn assemble(
    queries: &[ProviderQuery],
    ids: &[IdentityMatch],
    businesses: &HashMap<String, BusinessProfile>,
    prospects: &HashMap<String, ProspectProfile>,
) -> ProviderReply {
    queries
        .iter()
        .zip(ids)
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(query, ids)| {
            let record = EnrichedRecord {
                identity: ids.clone(),
                business: ids
                    .business_id
                    .as_ref()
                    .and_then(|id| businesses.get(id))
                    .cloned(),
                prospect: ids
                    .prospect_id
                    .as_ref()
                    .and_then(|id| prospects.get(id))
                    .cloned(),
            };
            (query.fingerprint.clone(), Ok(record))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::domain::EnrichmentRequest;
    use crate::enrichment::fingerprint;

    fn query(request: EnrichmentRequest) -> ProviderQuery {
        let resolved = fingerprint::resolve(&request).unwrap();
        ProviderQuery {
            fingerprint: resolved.fingerprint,
            identity: resolved.identity,
            known: None,
        }
    }

    #[test]
    fn test_business_ids_are_positional_and_padded() {
        let response = dto::MatchBusinessesResponse {
            matched_businesses: vec![
                dto::MatchedBusiness {
                    business_id: Some("b1".into()),
                },
                dto::MatchedBusiness {
                    business_id: Some(String::new()),
                },
            ],
        };
        assert_eq!(business_ids(response, 3), vec![Some("b1".into()), None, None]);
    }

    #[test]
    fn test_business_profiles_join_technographics() {
        let firmo = vec![dto::FirmographicsEntry {
            business_id: "b1".into(),
            data: Some(dto::Firmographics {
                name: Some("Acme".into()),
                linkedin_industry_category: Some("software development".into()),
                ..Default::default()
            }),
        }];
        let techno = vec![dto::TechnographicsEntry {
            business_id: "b1".into(),
            data: Some(dto::Technographics {
                full_tech_stack: vec!["Rust".into(), "PostgreSQL".into()],
            }),
        }];

        let workforce = vec![
            dto::WorkforceTrendsEntry {
                business_id: "b1".into(),
                data: Some(dto::WorkforceTrends {
                    perc_engineering_roles: Some(40.0),
                    profiles_found: Some(120),
                    ..Default::default()
                }),
            },
            // Empty trends add nothing
            dto::WorkforceTrendsEntry {
                business_id: "b2".into(),
                data: Some(dto::WorkforceTrends::default()),
            },
        ];

        let profiles = business_profiles(firmo, techno, workforce);

        let acme = &profiles["b1"];
        assert_eq!(acme.name.as_deref(), Some("Acme"));
        assert_eq!(acme.industry.as_deref(), Some("software development"));
        assert_eq!(acme.technologies, vec!["Rust", "PostgreSQL"]);
        let trends = acme.workforce.as_ref().unwrap();
        assert_eq!(trends.engineering, Some(40.0));
        assert_eq!(trends.profiles_counted, Some(120));
        assert!(!profiles.contains_key("b2"));
    }

    #[test]
    fn test_prospect_profiles_join_contacts() {
        let profiles = vec![dto::ProfileEntry {
            prospect_id: "p1".into(),
            data: Some(dto::ProspectProfileData {
                full_name: Some("Jane Doe".into()),
                job_title: Some("CTO".into()),
                ..Default::default()
            }),
        }];
        let contacts = vec![dto::ContactsEntry {
            prospect_id: "p1".into(),
            data: Some(dto::ContactInformation {
                professions_email: Some("jane@acme.com".into()),
                mobile_phone: None,
            }),
        }];

        let out = prospect_profiles(profiles, contacts);

        assert_eq!(out["p1"].job_title.as_deref(), Some("CTO"));
        assert_eq!(out["p1"].professional_email.as_deref(), Some("jane@acme.com"));
    }

    #[test]
    fn test_assemble_skips_unmatched_queries() {
        let acme = query(EnrichmentRequest::new("1").company("Acme"));
        let ghost = query(EnrichmentRequest::new("2").company("Ghost"));
        let ids = vec![
            IdentityMatch {
                business_id: Some("b1".into()),
                prospect_id: None,
            },
            IdentityMatch::default(),
        ];
        let businesses = HashMap::from([("b1".to_string(), BusinessProfile {
            name: Some("Acme".into()),
            ..Default::default()
        })]);

        let reply = assemble(&[acme.clone(), ghost.clone()], &ids, &businesses, &HashMap::new());

        assert_eq!(reply.len(), 1);
        let record = reply[&acme.fingerprint].as_ref().unwrap();
        assert_eq!(record.identity.business_id.as_deref(), Some("b1"));
        assert!(record.business.is_some());
        assert!(!reply.contains_key(&ghost.fingerprint));
    }

    #[test]
    fn test_match_inputs() {
        let q = query(
            EnrichmentRequest::new("1")
                .company("Acme Inc.")
                .person("Jane Doe")
                .email("Jane@Acme.com"),
        );
        let business = business_match_input(&q.identity);
        assert_eq!(business.name.as_deref(), Some("acme"));

        let prospect = prospect_match_input(&q.identity, Some("b1"));
        assert_eq!(prospect.full_name.as_deref(), Some("jane doe"));
        assert_eq!(prospect.email.as_deref(), Some("jane@acme.com"));
        assert_eq!(prospect.business_id.as_deref(), Some("b1"));
    }
}
