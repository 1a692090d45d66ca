//! In-process storage provider

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::domain::DomainError;
use crate::domain::cache::{CacheEntry, StorageProvider};

type SharedRegistry = Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

/// Process-wide storages, one per value type
static SHARED: Lazy<SharedRegistry> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Thread-safe in-memory storage provider
///
/// Entries are kept until overwritten or until the process terminates. There
/// is no eviction and no TTL removal.
#[derive(Debug)]
pub struct InMemoryStorage<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T> Default for InMemoryStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InMemoryStorage<T> {
    /// Creates a new, isolated storage
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.len())
            .unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> InMemoryStorage<T>
where
    T: Send + Sync + 'static,
{
    /// Returns the process-wide storage for `T`, creating it on first use
    pub fn shared() -> Arc<Self> {
        let mut registry = SHARED.lock().unwrap_or_else(PoisonError::into_inner);

        let storage = registry
            .entry(TypeId::of::<Self>())
            .or_insert_with(|| Arc::new(Self::new()) as Arc<dyn Any + Send + Sync>)
            .clone();

        storage
            .downcast::<Self>()
            .expect("shared storage registry is keyed by storage type")
    }
}

#[async_trait]
impl<T> StorageProvider<T> for InMemoryStorage<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    async fn read(&self, key: &str) -> Result<Option<CacheEntry<T>>, DomainError> {
        let entries = self.entries.read().map_err(|e| {
            DomainError::storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &str, entry: CacheEntry<T>) -> Result<(), DomainError> {
        let mut entries = self.entries.write().map_err(|e| {
            DomainError::storage(format!("Failed to acquire write lock: {}", e))
        })?;

        entries.insert(key.to_string(), entry);
        Ok(())
    }
}
