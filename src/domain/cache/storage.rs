//! Storage provider trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use super::entry::CacheEntry;
use crate::domain::DomainError;

/// Backend holding one [`CacheEntry`] per key
///
/// Implementations must not expire or evict entries on their own: freshness
/// is decided by the coordinator at read time, and stale entries stay usable
/// as provisional values until overwritten.
#[async_trait]
pub trait StorageProvider<T>: Send + Sync + Debug
where
    T: Send + Sync + 'static,
{
    /// Reads the entry for `key`, `None` when nothing was ever written
    async fn read(&self, key: &str) -> Result<Option<CacheEntry<T>>, DomainError>;

    /// Replaces the entry for `key`
    async fn write(&self, key: &str, entry: CacheEntry<T>) -> Result<(), DomainError>;
}
