//! Database module for contact persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Provides async operations for:
//! - Contact CRUD operations
//! - Merging enrichment results onto stored contacts
//!
//! # Example
//!
//! ```ignore
//! use contact_enricher::db::{init_db, list_contacts};
//!
//! let pool = init_db("sqlite:contacts.db").await?;
//! let contacts = list_contacts(&pool).await?;
//! ```

use std::path::Path;

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::enrichment::domain::EnrichedRecord;
use crate::model::Contact;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "contacts.db";

/// Contact store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Contact not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Could not encode enrichment data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Insert a contact, or update its identity fields if the id exists.
///
/// Stored enrichment data is left untouched.
pub async fn upsert_contact(pool: &SqlitePool, contact: &Contact) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO contacts (id, full_name, organization, domain, email)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            full_name = excluded.full_name,
            organization = excluded.organization,
            domain = excluded.domain,
            email = excluded.email
        "#,
    )
    .bind(&contact.id)
    .bind(&contact.full_name)
    .bind(&contact.organization)
    .bind(&contact.domain)
    .bind(&contact.email)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a single contact by id.
pub async fn get_contact(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<Contact>> {
    sqlx::query_as::<_, Contact>(
        "SELECT id, full_name, organization, domain, email, enrichment, enriched_at \
         FROM contacts WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Get all contacts ordered by id.
pub async fn list_contacts(pool: &SqlitePool) -> sqlx::Result<Vec<Contact>> {
    sqlx::query_as::<_, Contact>(
        "SELECT id, full_name, organization, domain, email, enrichment, enriched_at \
         FROM contacts ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

/// Ids of contacts that have never been enriched.
pub async fn unenriched_contact_ids(pool: &SqlitePool) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT id FROM contacts WHERE enrichment IS NULL ORDER BY id")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// SQLite-backed contact store.
#[derive(Debug, Clone)]
pub struct SqliteContactStore {
    pool: SqlitePool,
}

impl SqliteContactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Merge `record` onto the contact's stored enrichment.
    ///
    /// Fresh values win; fields the new record lacks keep their stored value.
    /// Read and write happen in one transaction.
    pub async fn merge_enrichment(
        &self,
        id: &str,
        record: &EnrichedRecord,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT enrichment FROM contacts WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((existing,)) = row else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        let mut merged = record.clone();
        if let Some(previous) = existing
            .as_deref()
            .and_then(|json| serde_json::from_str::<EnrichedRecord>(json).ok())
        {
            merged.merge(&previous);
        }

        sqlx::query("UPDATE contacts SET enrichment = ?, enriched_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&merged)?)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(contact = id, "Saved enrichment");
        Ok(())
    }
}
