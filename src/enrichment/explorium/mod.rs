//! Explorium API integration
//!
//! Explorium matches companies and people to stable ids and serves
//! firmographic, technographic, profile and contact data for them.
//! API docs: https://developers.explorium.ai/reference

mod adapter;
mod client;
pub mod dto;

pub use client::{DEFAULT_BASE_URL, ExploriumClient, PROVIDER_NAME};
