//! Per-call cache options and their resolved policy

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::entry::CacheEntry;

/// Per-call cache policy as supplied by the caller
///
/// Every field is optional. Unset fields are resolved by [`CachePolicy::resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Time in milliseconds before a cached value expires (unbounded when unset)
    pub expires_ms: Option<u64>,
    /// Always invoke the producer, even when a fresh cached value exists
    pub always_get_value: Option<bool>,
    /// Whether a fresh value equal to the cached one is emitted again
    pub emit_duplicates: Option<bool>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expiration window
    pub fn with_expires(mut self, expires: Duration) -> Self {
        self.expires_ms = Some(expires.as_millis().min(u64::MAX as u128) as u64);
        self
    }

    /// Sets the expiration window in milliseconds
    pub fn with_expires_ms(mut self, expires_ms: u64) -> Self {
        self.expires_ms = Some(expires_ms);
        self
    }

    pub fn with_always_get_value(mut self, always_get_value: bool) -> Self {
        self.always_get_value = Some(always_get_value);
        self
    }

    pub fn with_emit_duplicates(mut self, emit_duplicates: bool) -> Self {
        self.emit_duplicates = Some(emit_duplicates);
        self
    }
}

/// Fully resolved policy for one `observe` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// `None` means entries never expire
    pub expires: Option<Duration>,
    pub always_get_value: bool,
    pub emit_duplicates: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::resolve(None)
    }
}

impl CachePolicy {
    /// Resolves caller options into a concrete policy.
    ///
    /// Without options, duplicates are emitted and the producer is the source
    /// of truth for every call. With options, any unset flag resolves to
    /// `false`, so a bare expiration window is enough to serve fresh hits
    /// straight from the cache.
    pub fn resolve(options: Option<&CacheOptions>) -> Self {
        match options {
            None => Self {
                expires: None,
                always_get_value: false,
                emit_duplicates: true,
            },
            Some(options) => Self {
                expires: options.expires_ms.map(Duration::from_millis),
                always_get_value: options.always_get_value.unwrap_or(false),
                emit_duplicates: options.emit_duplicates.unwrap_or(false),
            },
        }
    }

    /// Whether the entry is still within its expiration window
    pub fn is_fresh<T>(&self, entry: &CacheEntry<T>) -> bool {
        match self.expires {
            Some(expires) => entry.age() < expires,
            None => true,
        }
    }

    /// Whether a fresh entry is served and the stream terminates without
    /// polling the producer
    pub fn serves_from_cache<T>(&self, entry: &CacheEntry<T>) -> bool {
        !self.emit_duplicates && !self.always_get_value && self.is_fresh(entry)
    }
}
