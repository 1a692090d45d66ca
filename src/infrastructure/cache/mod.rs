//! Cache infrastructure - Storage provider implementations

mod factory;
mod in_memory;
mod redis;

pub use factory::{StorageConfig, StorageFactory, StorageType};
pub use in_memory::InMemoryStorage;
pub use redis::{RedisStorage, RedisStorageConfig};
