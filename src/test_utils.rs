//! Test utilities and fixtures for contact-enricher tests.
//!
//! This module provides common test helpers, mock factories, and
//! database utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use contact_enricher::test_utils::{temp_db, mock_contact};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let contact = mock_contact("c1");
//!     // ... test logic
//! }
//! ```

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::model::Contact;

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Creates a contact at Acme with every identity field set.
///
/// Customize using struct update syntax:
///
/// ```ignore
/// let contact = Contact {
///     email: None,
///     ..mock_contact("c1")
/// };
/// ```
pub fn mock_contact(id: &str) -> Contact {
    Contact {
        full_name: Some("Jane Doe".to_string()),
        organization: Some("Acme Inc.".to_string()),
        domain: Some("acme.com".to_string()),
        email: Some("jane@acme.com".to_string()),
        ..Contact::new(id)
    }
}

/// Inserts a mock contact into the database.
pub async fn insert_mock_contact(pool: &SqlitePool, id: &str) -> Contact {
    let contact = mock_contact(id);
    crate::db::upsert_contact(pool, &contact)
        .await
        .expect("Failed to insert contact");
    contact
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        // Should be able to query
        let contacts = crate::db::list_contacts(&pool).await.unwrap();
        assert!(contacts.is_empty());
    }

    #[tokio::test]
    async fn test_insert_mock_contact() {
        let (pool, _dir) = temp_db().await;

        insert_mock_contact(&pool, "c1").await;

        let contacts = crate::db::list_contacts(&pool).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].organization.as_deref(), Some("Acme Inc."));
        assert!(contacts[0].enrichment.is_none());
    }

    #[test]
    fn test_mock_contact_is_resolvable() {
        let request = mock_contact("c1").to_request();
        assert!(crate::enrichment::fingerprint::resolve(&request).is_ok());
    }
}
