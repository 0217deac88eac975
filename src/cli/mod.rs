//! Command-line interface for contact-enricher.
//!
//! This module provides CLI commands for enriching contacts, managing the
//! local contact store and inspecting configuration.

mod commands;

pub use commands::{Cli, Commands, ConfigAction, run_command};
