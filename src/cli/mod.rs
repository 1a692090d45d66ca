//! CLI module for cache-observer
//!
//! Provides subcommands:
//! - `fetch`: observe a JSON URL through the cache coordinator
//! - `strategies`: list the named cache presets

pub mod fetch;
pub mod strategies;

use clap::{Parser, Subcommand};

/// cache-observer - cache-aware fetching of JSON resources
#[derive(Parser)]
#[command(name = "cache-observer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch a URL through the cache and print every emission
    Fetch(fetch::FetchArgs),

    /// List the available cache strategies
    Strategies,
}
