//! Storage factory for runtime selection

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;
use crate::domain::cache::StorageProvider;

use super::in_memory::InMemoryStorage;
use super::redis::{RedisStorage, RedisStorageConfig};

/// Supported storage types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Process-wide in-memory map
    #[default]
    InMemory,
    /// Redis
    Redis,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::InMemory => write!(f, "in_memory"),
            StorageType::Redis => write!(f, "redis"),
        }
    }
}

/// Configuration for the storage factory
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Type of storage to create
    pub storage_type: StorageType,
    /// Redis URL (required for Redis type)
    pub redis_url: Option<String>,
    /// Key prefix for namespacing (Redis only)
    pub key_prefix: Option<String>,
    /// Connection timeout in seconds (Redis only)
    pub connection_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::InMemory,
            redis_url: None,
            key_prefix: None,
            connection_timeout_secs: 5,
        }
    }
}

impl StorageConfig {
    /// Creates a configuration for the shared in-memory storage
    pub fn in_memory() -> Self {
        Self {
            storage_type: StorageType::InMemory,
            ..Default::default()
        }
    }

    /// Creates a configuration for Redis storage
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            storage_type: StorageType::Redis,
            redis_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Sets the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// Factory for creating storage providers
#[derive(Debug, Default)]
pub struct StorageFactory;

impl StorageFactory {
    pub fn new() -> Self {
        Self
    }

    /// Creates a storage provider based on configuration
    pub async fn create<T>(
        &self,
        config: &StorageConfig,
    ) -> Result<Arc<dyn StorageProvider<T>>, DomainError>
    where
        T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        match config.storage_type {
            StorageType::InMemory => Ok(InMemoryStorage::<T>::shared()),
            StorageType::Redis => {
                let url = config.redis_url.clone().ok_or_else(|| {
                    DomainError::configuration("Redis URL is required for Redis storage type")
                })?;

                let mut redis_config = RedisStorageConfig::new(url)
                    .with_connection_timeout(Duration::from_secs(config.connection_timeout_secs));

                if let Some(prefix) = &config.key_prefix {
                    redis_config = redis_config.with_key_prefix(prefix.clone());
                }

                let storage = RedisStorage::<T>::new(redis_config).await?;
                Ok(Arc::new(storage))
            }
        }
    }
}
