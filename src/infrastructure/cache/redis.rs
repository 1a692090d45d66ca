//! Redis storage provider

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::DomainError;
use crate::domain::cache::{CacheEntry, StorageProvider};

/// Configuration for Redis storage
#[derive(Debug, Clone)]
pub struct RedisStorageConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: Option<String>,
    /// Connection timeout
    pub connection_timeout: Duration,
}

impl Default for RedisStorageConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: None,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisStorageConfig {
    /// Creates a new configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Sets the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    fn prefix_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

/// Redis-backed storage provider
///
/// Entries are stored as JSON without a Redis expiry, so stale values remain
/// readable until the next successful write for the key.
pub struct RedisStorage<T> {
    connection: ConnectionManager,
    config: RedisStorageConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for RedisStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl<T> RedisStorage<T> {
    /// Connects to Redis
    pub async fn new(config: RedisStorageConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            DomainError::storage(format!("Failed to create Redis client: {}", e))
        })?;

        let connecting = ConnectionManager::new(client);
        let connection = tokio::time::timeout(config.connection_timeout, connecting)
            .await
            .map_err(|_| {
                DomainError::storage(format!(
                    "Timed out connecting to Redis after {:?}",
                    config.connection_timeout
                ))
            })?
            .map_err(|e| DomainError::storage(format!("Failed to connect to Redis: {}", e)))?;

        tracing::debug!(url = %config.url, prefix = ?config.key_prefix, "Connected Redis storage");

        Ok(Self {
            connection,
            config,
            _marker: PhantomData,
        })
    }

    /// Connects to Redis with default configuration
    pub async fn with_url(url: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(RedisStorageConfig::new(url)).await
    }
}

fn encode_entry<T: Serialize>(entry: &CacheEntry<T>) -> Result<String, DomainError> {
    serde_json::to_string(entry)
        .map_err(|e| DomainError::serialization(format!("Failed to serialize cache entry: {}", e)))
}

fn decode_entry<T: DeserializeOwned>(data: &str) -> Result<CacheEntry<T>, DomainError> {
    serde_json::from_str(data).map_err(|e| {
        DomainError::serialization(format!("Failed to deserialize cache entry: {}", e))
    })
}

#[async_trait]
impl<T> StorageProvider<T> for RedisStorage<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn read(&self, key: &str) -> Result<Option<CacheEntry<T>>, DomainError> {
        let prefixed_key = self.config.prefix_key(key);
        let mut conn = self.connection.clone();

        let data: Option<String> = conn.get(&prefixed_key).await.map_err(|e| {
            DomainError::storage(format!("Failed to get key '{}': {}", key, e))
        })?;

        data.as_deref().map(decode_entry::<T>).transpose()
    }

    async fn write(&self, key: &str, entry: CacheEntry<T>) -> Result<(), DomainError> {
        let prefixed_key = self.config.prefix_key(key);
        let data = encode_entry(&entry)?;
        let mut conn = self.connection.clone();

        let _: () = conn
            .set(&prefixed_key, data)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to set key '{}': {}", key, e)))?;

        Ok(())
    }
}
