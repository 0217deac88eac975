//! Identity fingerprints for cache lookup and request deduplication.
//!
//! A fingerprint is a SHA-256 digest over the normalized identity fields of a
//! request. Normalization trims, lowercases and collapses whitespace, strips
//! common corporate suffixes from company names ("Acme Inc." == "acme") and
//! reduces domains to their bare host ("https://www.Acme.com/about" == "acme.com").
//!
//! At least one identity anchor (company name or domain) is required.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::enrichment::domain::{EnrichmentError, EnrichmentRequest, NormalizedIdentity};

/// Legal-form suffixes dropped from the end of company names
const CORPORATE_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "llc",
    "llp",
    "lp",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "company",
    "gmbh",
    "plc",
    "sa",
    "ag",
    "bv",
    "pty",
    "srl",
];

/// Separator between fields in the digest input (ASCII unit separator)
const FIELD_SEPARATOR: u8 = 0x1f;

/// Deterministic digest of normalized identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_hex(hex: &str) -> Self {
        Self(hex.to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request whose identity has been normalized and fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub fingerprint: Fingerprint,
    pub identity: NormalizedIdentity,
}

/// Normalize a request's identity fields and derive its fingerprint.
///
/// Fails with [`EnrichmentError::NonResolvableIdentity`] when neither a
/// company name nor a domain survives normalization.
pub fn resolve(request: &EnrichmentRequest) -> Result<ResolvedIdentity, EnrichmentError> {
    let identity = NormalizedIdentity {
        company: request.company_name.as_deref().and_then(normalize_company),
        domain: request.domain.as_deref().and_then(normalize_domain),
        person: request.person_name.as_deref().and_then(normalize_person),
        email: request.email.as_deref().and_then(normalize_email),
    };

    if identity.company.is_none() && identity.domain.is_none() {
        return Err(EnrichmentError::NonResolvableIdentity);
    }

    Ok(ResolvedIdentity {
        fingerprint: digest(&identity),
        identity,
    })
}

fn digest(identity: &NormalizedIdentity) -> Fingerprint {
    let mut hasher = Sha256::new();
    for field in [
        &identity.company,
        &identity.domain,
        &identity.person,
        &identity.email,
    ] {
        hasher.update(field.as_deref().unwrap_or_default().as_bytes());
        hasher.update([FIELD_SEPARATOR]);
    }
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Lowercase, fold punctuation to spaces, drop trailing legal-form suffixes.
pub fn normalize_company(raw: &str) -> Option<String> {
    let folded: String = raw
        .chars()
        .map(|c| match c {
            '.' | ',' | '(' | ')' | '"' | '\'' => ' ',
            c => c,
        })
        .collect::<String>()
        .to_lowercase();

    let mut tokens: Vec<&str> = folded.split_whitespace().collect();
    // Keep at least one token so "Inc." on its own still resolves
    while tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|last| CORPORATE_SUFFIXES.contains(last))
    {
        tokens.pop();
    }
    // "Smith & Co" leaves a dangling "&"
    while tokens.len() > 1 && tokens.last().is_some_and(|last| *last == "&" || *last == "-") {
        tokens.pop();
    }

    non_empty(tokens.join(" "))
}

/// Reduce a domain or URL to its bare lowercase host.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(lowered.as_str());
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);

    non_empty(host.trim_end_matches('.').to_string())
}

pub fn normalize_person(raw: &str) -> Option<String> {
    non_empty(
        raw.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    )
}

pub fn normalize_email(raw: &str) -> Option<String> {
    non_empty(raw.trim().to_lowercase())
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request(company: &str, domain: &str) -> EnrichmentRequest {
        EnrichmentRequest::new("r").company(company).domain(domain)
    }

    #[test]
    fn test_corporate_suffix_is_stripped() {
        assert_eq!(normalize_company("Acme Inc.").as_deref(), Some("acme"));
        assert_eq!(normalize_company("acme inc").as_deref(), Some("acme"));
        assert_eq!(normalize_company("  ACME,   Inc ").as_deref(), Some("acme"));
        assert_eq!(normalize_company("Acme Holdings Co. Ltd").as_deref(), Some("acme holdings"));
        assert_eq!(normalize_company("Inc.").as_deref(), Some("inc"));
    }

    #[test]
    fn test_domain_normalization() {
        assert_eq!(normalize_domain("https://www.Acme.com/about").as_deref(), Some("acme.com"));
        assert_eq!(normalize_domain(" ACME.COM. ").as_deref(), Some("acme.com"));
        assert_eq!(normalize_domain("http://acme.com:8080?x=1").as_deref(), Some("acme.com"));
        assert_eq!(normalize_domain("   "), None);
    }

    #[test]
    fn test_equivalent_companies_share_fingerprint() {
        let a = resolve(&request("Acme Inc.", "acme.com")).unwrap();
        let b = resolve(&request("acme inc", "ACME.com")).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_different_people_differ() {
        let a = resolve(&request("Acme", "acme.com").person("Jane Doe")).unwrap();
        let b = resolve(&request("Acme", "acme.com").person("John Doe")).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_field_boundaries_matter() {
        // "ab" + "" must not collide with "a" + "b"
        let a = resolve(&EnrichmentRequest::new("r").company("ab")).unwrap();
        let b = resolve(&EnrichmentRequest::new("r").company("a").domain("b")).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_missing_anchor_is_non_resolvable() {
        let req = EnrichmentRequest::new("r").person("Jane").email("jane@acme.com");
        assert_eq!(resolve(&req), Err(EnrichmentError::NonResolvableIdentity));

        let blank = EnrichmentRequest::new("r").company("   ").domain("");
        assert_eq!(resolve(&blank), Err(EnrichmentError::NonResolvableIdentity));
    }

    #[test]
    fn test_domain_alone_is_enough() {
        let resolved = resolve(&EnrichmentRequest::new("r").domain("acme.com")).unwrap();
        assert_eq!(resolved.identity.domain.as_deref(), Some("acme.com"));
        assert_eq!(resolved.fingerprint.as_str().len(), 64);
    }

    fn mangle(s: &str, flips: &[bool], pad_left: usize, pad_right: usize) -> String {
        let body: String = s
            .chars()
            .zip(flips.iter().cycle())
            .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
            .collect();
        format!("{}{}{}", " ".repeat(pad_left), body, "\t".repeat(pad_right))
    }

    proptest! {
        #[test]
        fn prop_case_and_whitespace_do_not_change_fingerprint(
            company in "[a-z]{1,10}( [a-z]{1,10}){0,2}",
            domain in "[a-z]{1,10}\\.(com|io|org)",
            person in "[a-z]{1,8} [a-z]{1,8}",
            flips in proptest::collection::vec(any::<bool>(), 1..8),
            pad_left in 0usize..3,
            pad_right in 0usize..3,
        ) {
            let plain = EnrichmentRequest::new("a")
                .company(company.clone())
                .domain(domain.clone())
                .person(person.clone());
            let noisy = EnrichmentRequest::new("b")
                .company(mangle(&company, &flips, pad_left, pad_right))
                .domain(mangle(&domain, &flips, pad_right, pad_left))
                .person(mangle(&person, &flips, pad_left, pad_right));

            let a = resolve(&plain).unwrap();
            let b = resolve(&noisy).unwrap();
            prop_assert_eq!(a.fingerprint, b.fingerprint);
        }
    }
}
