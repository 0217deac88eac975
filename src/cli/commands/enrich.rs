//! Enrichment commands: one contact, a JSON file of requests, or stored contacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::config::Config;
use crate::db::{self, SqliteContactStore};
use crate::enrichment::{EnrichmentRequest, EnrichmentWorkers};
use crate::error::{Error, ResultExt};

use super::{build_service, print_result, resolve_api_key};

/// Identity flags given to `enrich`
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub company: Option<String>,
    pub domain: Option<String>,
    pub person: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    fn into_request(self) -> EnrichmentRequest {
        EnrichmentRequest {
            company_name: self.company,
            domain: self.domain,
            person_name: self.person,
            email: self.email,
            ..EnrichmentRequest::new("cli")
        }
    }
}

/// Enrich a single contact given by flags
pub fn cmd_enrich(
    rt: &Runtime,
    config: &Config,
    identity: Identity,
    api_key: Option<&str>,
    refresh: bool,
    json: bool,
) -> anyhow::Result<()> {
    let api_key = resolve_api_key(api_key, config)?;
    let request = identity.into_request();

    rt.block_on(async {
        let service = build_service(config, api_key)?;

        let outcome = if refresh {
            service.refresh(&request).await
        } else {
            service.enrich_one(&request).await
        };

        match outcome {
            Ok(result) if json => println!("{}", serde_json::to_string_pretty(&result)?),
            Ok(result) => print_result(&result),
            Err(e) => {
                anyhow::bail!("Enrichment failed [{}]: {}", e.code(), e);
            }
        }
        Ok(())
    })
}

/// Enrich every request in a JSON file through the batch path
pub fn cmd_enrich_file(
    rt: &Runtime,
    config: &Config,
    path: &PathBuf,
    api_key: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let api_key = resolve_api_key(api_key, config)?;
    let requests = read_requests(path)?;
    if requests.is_empty() {
        println!("No requests in {:?}", path);
        return Ok(());
    }

    rt.block_on(async {
        let service = build_service(config, api_key)?;
        println!("Enriching {} requests from {:?}...", requests.len(), path);

        let mut results: Vec<_> = service.enrich_batch(&requests).await.into_iter().collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));

        if json {
            let entries: Vec<serde_json::Value> = results
                .iter()
                .map(|(id, outcome)| match outcome {
                    Ok(result) => serde_json::json!({ "id": id, "result": result }),
                    Err(e) => serde_json::json!({
                        "id": id,
                        "error": { "code": e.code(), "kind": e.kind(), "message": e.to_string() },
                    }),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        let mut succeeded = 0;
        let mut partial = 0;
        let mut failed = 0;
        for (id, outcome) in &results {
            match outcome {
                Ok(result) => {
                    if result.partial {
                        partial += 1;
                    } else {
                        succeeded += 1;
                    }
                    print_result(result);
                }
                Err(e) => {
                    failed += 1;
                    println!("✗ {} [{}]: {}", id, e.code(), e);
                }
            }
        }

        println!();
        println!("=== Summary ===");
        println!("Enriched:  {}", succeeded);
        println!("Partial:   {}", partial);
        println!("Failed:    {}", failed);

        let status = service.status();
        if let Some(spend) = &status.spend {
            println!(
                "Provider:  {} calls, {} credits spent",
                spend.total_calls, spend.total_spent
            );
        }
        println!(
            "Cache:     {} hits, {} misses",
            status.cache.hits, status.cache.misses
        );
        Ok(())
    })
}

/// Enrich contacts from the local store using the worker pool
pub fn cmd_enrich_stored(
    rt: &Runtime,
    config: &Config,
    ids: &[String],
    api_key: Option<&str>,
    workers: Option<usize>,
    db_path: Option<&Path>,
) -> anyhow::Result<()> {
    let api_key = resolve_api_key(api_key, config)?;
    let workers = workers.unwrap_or(config.service.workers).max(1);

    rt.block_on(async {
        let pool = db::init_db(&db::db_url(db_path))
            .await
            .with_context("opening contact store")?;

        let ids = if ids.is_empty() {
            db::unenriched_contact_ids(&pool).await?
        } else {
            ids.to_vec()
        };
        if ids.is_empty() {
            println!("Nothing to enrich.");
            return Ok(());
        }

        let service = build_service(config, api_key)?;
        let store = Arc::new(SqliteContactStore::new(pool));
        let jobs = EnrichmentWorkers::spawn(service, store, workers, workers * 4);

        println!("Enriching {} contacts with {} workers...", ids.len(), workers);

        let mut receivers = Vec::with_capacity(ids.len());
        for id in &ids {
            receivers.push((id, jobs.submit(id.as_str()).await?));
        }

        let mut enriched = 0;
        let mut failed = 0;
        for (id, rx) in receivers {
            match rx.await {
                Ok(Ok(result)) => {
                    enriched += 1;
                    let marker = if result.partial { "~" } else { "✓" };
                    println!("{} {}", marker, id);
                }
                Ok(Err(e)) => {
                    failed += 1;
                    println!("✗ {}: {}", id, e);
                }
                Err(_) => {
                    failed += 1;
                    println!("✗ {}: worker stopped before finishing", id);
                }
            }
        }
        jobs.shutdown().await;

        println!();
        println!("=== Summary ===");
        println!("Enriched:  {}", enriched);
        println!("Failed:    {}", failed);
        Ok(())
    })
}

fn read_requests(path: &Path) -> Result<Vec<EnrichmentRequest>, Error> {
    let raw = std::fs::read_to_string(path).with_context(format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| Error::invalid_input(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_into_request() {
        let request = Identity {
            company: Some("Acme".into()),
            email: Some("jane@acme.com".into()),
            ..Default::default()
        }
        .into_request();

        assert_eq!(request.id.as_str(), "cli");
        assert_eq!(request.company_name.as_deref(), Some("Acme"));
        assert_eq!(request.email.as_deref(), Some("jane@acme.com"));
        assert!(request.person_name.is_none());
    }

    #[test]
    fn test_read_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "1", "company_name": "Acme Inc.", "domain": "acme.com"},
                {"id": "2", "person_name": "Jane Doe", "email": "jane@acme.com"}
            ]"#,
        )
        .unwrap();

        let requests = read_requests(&path).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].domain.as_deref(), Some("acme.com"));
        assert!(requests[1].company_name.is_none());
    }

    #[test]
    fn test_read_requests_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.json");
        std::fs::write(&path, r#"{"id": "not an array"}"#).unwrap();

        let err = read_requests(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn test_read_requests_missing_file() {
        let err = read_requests(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("reading"));
    }
}
