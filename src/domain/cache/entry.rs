//! Cache entry stored per key

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached value together with the moment it was written
///
/// Entries are never mutated in place. Every successful producer completion
/// replaces the entry for its key wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached payload
    pub value: T,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Creates an entry stamped with the current time
    pub fn new(value: T) -> Self {
        Self::with_created_at(value, Utc::now())
    }

    /// Creates an entry with an explicit creation time
    pub fn with_created_at(value: T, created_at: DateTime<Utc>) -> Self {
        Self { value, created_at }
    }

    /// Age of the entry relative to `now`, clamped to zero for future timestamps
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Age of the entry relative to the current time
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
