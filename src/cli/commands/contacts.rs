//! Local contact store commands.

use std::path::Path;

use tokio::runtime::Runtime;

use crate::db;
use crate::error::ResultExt;
use crate::model::Contact;

/// Add or update a contact
pub fn cmd_add_contact(
    rt: &Runtime,
    db_path: Option<&Path>,
    contact: Contact,
) -> anyhow::Result<()> {
    if contact.organization.is_none()
        && contact.domain.is_none()
        && contact.full_name.is_none()
        && contact.email.is_none()
    {
        anyhow::bail!("A contact needs at least one of --person, --company, --domain or --email");
    }

    rt.block_on(async {
        let pool = db::init_db(&db::db_url(db_path))
            .await
            .with_context("opening contact store")?;
        db::upsert_contact(&pool, &contact).await?;
        println!("Saved contact {}", contact.id);
        Ok(())
    })
}

/// List all contacts in the store
pub fn cmd_list(rt: &Runtime, db_path: Option<&Path>) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = db::init_db(&db::db_url(db_path))
            .await
            .with_context("opening contact store")?;
        let contacts = db::list_contacts(&pool).await?;

        println!("Found {} contacts:", contacts.len());
        for contact in contacts {
            let status = match &contact.enriched_at {
                Some(at) => format!("enriched {}", at),
                None => "not enriched".to_string(),
            };
            println!(
                "{} | {} | {} | {} | {}",
                contact.id,
                contact.full_name.as_deref().unwrap_or("-"),
                contact
                    .organization
                    .as_deref()
                    .or(contact.domain.as_deref())
                    .unwrap_or("-"),
                contact.email.as_deref().unwrap_or("-"),
                status
            );
        }
        Ok(())
    })
}
