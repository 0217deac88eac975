//! CLI command definitions and dispatch.
//!
//! This module provides the command-line interface for Contact Enricher.
//! Each subcommand is implemented in its own submodule for maintainability:
//! - `enrich`: One-off, file-based and stored-contact enrichment
//! - `contacts`: Managing the local contact store
//! - `settings`: Config file management and status

mod contacts;
mod enrich;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::enrichment::{EnrichmentResult, EnrichmentService, ExploriumClient, Provenance};

pub use contacts::{cmd_add_contact, cmd_list};
pub use enrich::{Identity, cmd_enrich, cmd_enrich_file, cmd_enrich_stored};
pub use settings::{cmd_config, cmd_status};

/// Contact Enricher CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "CONTACT_ENRICHER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Enrich a single contact given on the command line
    Enrich {
        /// Company name
        #[arg(long)]
        company: Option<String>,
        /// Company web domain
        #[arg(long)]
        domain: Option<String>,
        /// Person's full name
        #[arg(long)]
        person: Option<String>,
        /// Person's email address
        #[arg(long)]
        email: Option<String>,
        /// Bypass and replace any cached data
        #[arg(long)]
        refresh: bool,
        /// Explorium API key (or set EXPLORIUM_API_KEY env var)
        #[arg(short, long, env = "EXPLORIUM_API_KEY")]
        api_key: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Enrich every request in a JSON file as one batch
    EnrichFile {
        /// JSON array of requests ({"id", "company_name", "domain", "person_name", "email"})
        path: PathBuf,
        /// Explorium API key (or set EXPLORIUM_API_KEY env var)
        #[arg(short, long, env = "EXPLORIUM_API_KEY")]
        api_key: Option<String>,
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add or update a contact in the local store
    AddContact {
        /// Contact id
        id: String,
        #[arg(long)]
        person: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List contacts in the local store
    List {
        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Enrich stored contacts using the background workers
    EnrichStored {
        /// Contact ids (default: every contact not yet enriched)
        ids: Vec<String>,
        /// Explorium API key (or set EXPLORIUM_API_KEY env var)
        #[arg(short, long, env = "EXPLORIUM_API_KEY")]
        api_key: Option<String>,
        /// Number of workers (default: from config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show effective settings and whether credentials are present
    Status,
}

/// `config` subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = load_config(cli.config.as_deref());

    match &cli.command {
        Commands::Enrich {
            company,
            domain,
            person,
            email,
            refresh,
            api_key,
            json,
        } => cmd_enrich(
            &rt,
            &config,
            Identity {
                company: company.clone(),
                domain: domain.clone(),
                person: person.clone(),
                email: email.clone(),
            },
            api_key.as_deref(),
            *refresh,
            *json,
        ),
        Commands::EnrichFile {
            path,
            api_key,
            json,
        } => cmd_enrich_file(&rt, &config, path, api_key.as_deref(), *json),
        Commands::AddContact {
            id,
            person,
            company,
            domain,
            email,
            db,
        } => cmd_add_contact(
            &rt,
            db.as_deref(),
            crate::model::Contact {
                full_name: person.clone(),
                organization: company.clone(),
                domain: domain.clone(),
                email: email.clone(),
                ..crate::model::Contact::new(id.as_str())
            },
        ),
        Commands::List { db } => cmd_list(&rt, db.as_deref()),
        Commands::EnrichStored {
            ids,
            api_key,
            workers,
            db,
        } => cmd_enrich_stored(&rt, &config, ids, api_key.as_deref(), *workers, db.as_deref()),
        Commands::Config { action } => cmd_config(&config, cli.config.as_deref(), action),
        Commands::Status => cmd_status(&config, cli.config.as_deref()),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
}

/// API key from the flag/env var, falling back to the config file.
pub(crate) fn resolve_api_key(flag: Option<&str>, config: &Config) -> anyhow::Result<String> {
    flag.map(str::to_string)
        .or_else(|| config.credentials.explorium_api_key.clone())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Explorium API key required. Use --api-key, set EXPLORIUM_API_KEY, \
                 or add explorium_api_key under [credentials] in the config file"
            )
        })
}

/// Build the enrichment service against the configured Explorium endpoint.
///
/// Must be called inside the runtime: the service spawns its batcher.
pub(crate) fn build_service(
    config: &Config,
    api_key: String,
) -> anyhow::Result<Arc<EnrichmentService>> {
    config.validate().context("invalid configuration")?;

    let client = ExploriumClient::new(
        api_key,
        config.provider.base_url.as_str(),
        std::time::Duration::from_secs(config.provider.request_timeout_secs),
    )?
    .with_name(config.provider.name.as_str());
    let service = EnrichmentService::new(config.enrichment_config(), Arc::new(client))?;
    Ok(Arc::new(service))
}

/// Print a human-readable summary of one result
pub(crate) fn print_result(result: &EnrichmentResult) {
    let source = match result.provenance {
        Provenance::Fresh => "provider",
        Provenance::Cached => "cache",
    };
    if result.partial {
        println!("~ {} (partial, from {})", result.request_id, source);
        for section in &result.missing {
            println!("    missing: {:?}", section);
        }
    } else {
        println!("✓ {} (from {})", result.request_id, source);
    }

    if let Some(business) = &result.record.business {
        if let Some(name) = &business.name {
            println!("  Company:   {}", name);
        }
        if let Some(website) = &business.website {
            println!("  Website:   {}", website);
        }
        if let Some(industry) = &business.industry {
            println!("  Industry:  {}", industry);
        }
        if let Some(employees) = &business.employee_range {
            println!("  Employees: {}", employees);
        }
        if let Some(revenue) = &business.revenue_range {
            println!("  Revenue:   {}", revenue);
        }
        match (&business.city, &business.country) {
            (Some(city), Some(country)) => println!("  Location:  {}, {}", city, country),
            (None, Some(country)) => println!("  Location:  {}", country),
            _ => {}
        }
        if !business.technologies.is_empty() {
            println!("  Tech:      {}", business.technologies.join(", "));
        }
        if let Some(workforce) = &business.workforce {
            let shares: Vec<String> = [
                ("engineering", workforce.engineering),
                ("sales", workforce.sales),
                ("marketing", workforce.marketing),
            ]
            .iter()
            .filter_map(|(role, share)| share.map(|s| format!("{} {:.0}%", role, s)))
            .collect();
            if !shares.is_empty() {
                println!("  Workforce: {}", shares.join(", "));
            }
        }
    }
    if let Some(prospect) = &result.record.prospect {
        if let Some(name) = &prospect.full_name {
            println!("  Person:    {}", name);
        }
        if let Some(title) = &prospect.job_title {
            println!("  Title:     {}", title);
        }
        if let Some(email) = &prospect.professional_email {
            println!("  Email:     {}", email);
        }
        if let Some(phone) = &prospect.phone {
            println!("  Phone:     {}", phone);
        }
        if let Some(linkedin) = &prospect.linkedin_url {
            println!("  LinkedIn:  {}", linkedin);
        }
    }
}
