//! Strategies command - lists the named cache presets

use serde::Serialize;

use crate::domain::cache::{CacheOptions, CacheStrategy};

#[derive(Debug, Serialize)]
struct StrategyListing {
    name: &'static str,
    options: CacheOptions,
}

fn listings() -> Vec<StrategyListing> {
    CacheStrategy::ALL
        .iter()
        .map(|strategy| StrategyListing {
            name: strategy.as_str(),
            options: strategy.options(),
        })
        .collect()
}

/// Print every preset with its options, one JSON document per line
pub fn run() -> anyhow::Result<()> {
    for listing in listings() {
        println!("{}", serde_json::to_string(&listing)?);
    }

    Ok(())
}
