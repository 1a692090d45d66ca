//! Fetch command - observes a URL through the cache coordinator

use std::str::FromStr;
use std::time::Duration;

use clap::Args;
use futures::StreamExt;
use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::DomainError;
use crate::domain::cache::{CacheOptions, CacheStrategy};
use crate::infrastructure::cache::StorageFactory;
use crate::infrastructure::http::HttpProducer;
use crate::infrastructure::logging;
use crate::infrastructure::services::CacheCoordinator;

/// `--strategy` value: a preset, or `none` for no options at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    None,
    Preset(CacheStrategy),
}

impl FromStr for StrategyArg {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(StrategyArg::None);
        }
        s.parse().map(StrategyArg::Preset)
    }
}

/// Arguments for the fetch command
#[derive(Args, Clone, Debug)]
pub struct FetchArgs {
    /// URL returning a JSON document
    pub url: String,

    /// Cache key (defaults to the URL)
    #[arg(long)]
    pub key: Option<String>,

    /// Preset: none, one-minute, one-hour, one-day or fresh (overrides config)
    #[arg(long)]
    pub strategy: Option<StrategyArg>,

    /// Expiration window in milliseconds
    #[arg(long)]
    pub expires_ms: Option<u64>,

    /// Always fetch, even when a fresh cached value exists
    #[arg(long)]
    pub always_get_value: bool,

    /// Emit a fetched value even when it equals the cached one
    #[arg(long)]
    pub emit_duplicates: Option<bool>,

    /// Number of times to observe the URL
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Pause between observations in milliseconds
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,
}

impl FetchArgs {
    /// Builds the per-call options from the preset and explicit flags.
    ///
    /// Explicit flags override the preset's fields. With neither, the call
    /// runs without options.
    pub fn cache_options(&self, default_strategy: Option<CacheStrategy>) -> Option<CacheOptions> {
        let preset = match self.strategy {
            Some(StrategyArg::None) => None,
            Some(StrategyArg::Preset(strategy)) => Some(strategy.options()),
            None => default_strategy.map(CacheStrategy::options),
        };

        let overridden =
            self.expires_ms.is_some() || self.always_get_value || self.emit_duplicates.is_some();
        if !overridden {
            return preset;
        }

        let mut options = preset.unwrap_or_default();
        if let Some(expires_ms) = self.expires_ms {
            options = options.with_expires_ms(expires_ms);
        }
        if self.always_get_value {
            options = options.with_always_get_value(true);
        }
        if let Some(emit_duplicates) = self.emit_duplicates {
            options = options.with_emit_duplicates(emit_duplicates);
        }

        Some(options)
    }
}

#[derive(Debug, Serialize)]
struct Emission<'a> {
    round: u32,
    emission: usize,
    value: &'a serde_json::Value,
}

/// Run the fetch command
pub async fn run(args: FetchArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    init_logging(&config);

    let storage = StorageFactory::new()
        .create::<serde_json::Value>(&config.storage)
        .await?;
    info!(storage_type = %config.storage.storage_type, "Storage ready");

    let mut coordinator = CacheCoordinator::<serde_json::Value, DomainError>::new(storage);
    if config.coordinator.single_flight {
        coordinator = coordinator.with_single_flight();
    }

    let producer = HttpProducer::with_timeout(Duration::from_secs(config.http.timeout_secs))?;
    let options = args.cache_options(config.coordinator.default_strategy);
    let key = args.key.clone().unwrap_or_else(|| args.url.clone());

    for round in 1..=args.repeat.max(1) {
        if round > 1 && args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }

        info!(round, key = %key, options = ?options, "Observing");

        let mut emissions =
            coordinator.observe(key.clone(), producer.get_json(args.url.clone()), options.as_ref());
        let mut count = 0;

        while let Some(emission) = emissions.next().await {
            let value = emission?;
            count += 1;

            let line = serde_json::to_string(&Emission {
                round,
                emission: count,
                value: &value,
            })?;
            println!("{}", line);
        }

        if count == 0 {
            info!(round, key = %key, "Fetched value unchanged, nothing emitted");
        }
    }

    Ok(())
}

fn init_logging(config: &AppConfig) {
    logging::init_logging(&logging::LoggingConfig {
        level: config.logging.level.clone(),
        format: config.logging.format.clone(),
    });
}
