//! Named cache option presets

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::options::CacheOptions;
use crate::domain::DomainError;

const ONE_MINUTE_MS: u64 = 60_000;
const ONE_HOUR_MS: u64 = 3_600_000;
const ONE_DAY_MS: u64 = 86_400_000;

const VALID_NAMES: &str = "one-minute, one-hour, one-day, fresh";

/// Canned [`CacheOptions`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Serve cached values for up to a minute
    OneMinute,
    /// Serve cached values for up to an hour
    OneHour,
    /// Serve cached values for up to a day
    OneDay,
    /// Emit the cached value, then the fresh value unless it is unchanged
    Fresh,
}

impl CacheStrategy {
    pub const ALL: [CacheStrategy; 4] = [
        CacheStrategy::OneMinute,
        CacheStrategy::OneHour,
        CacheStrategy::OneDay,
        CacheStrategy::Fresh,
    ];

    pub fn options(self) -> CacheOptions {
        match self {
            CacheStrategy::OneMinute => CacheOptions::new().with_expires_ms(ONE_MINUTE_MS),
            CacheStrategy::OneHour => CacheOptions::new().with_expires_ms(ONE_HOUR_MS),
            CacheStrategy::OneDay => CacheOptions::new().with_expires_ms(ONE_DAY_MS),
            CacheStrategy::Fresh => CacheOptions::new()
                .with_always_get_value(true)
                .with_emit_duplicates(false),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheStrategy::OneMinute => "one-minute",
            CacheStrategy::OneHour => "one-hour",
            CacheStrategy::OneDay => "one-day",
            CacheStrategy::Fresh => "fresh",
        }
    }
}

impl From<CacheStrategy> for CacheOptions {
    fn from(strategy: CacheStrategy) -> Self {
        strategy.options()
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "one-minute" | "oneminute" => Ok(CacheStrategy::OneMinute),
            "one-hour" | "onehour" => Ok(CacheStrategy::OneHour),
            "one-day" | "oneday" => Ok(CacheStrategy::OneDay),
            "fresh" => Ok(CacheStrategy::Fresh),
            _ => Err(DomainError::configuration(format!(
                "Unknown cache strategy: {}. Valid strategies: {}",
                s,
                VALID_NAMES
            ))),
        }
    }
}
