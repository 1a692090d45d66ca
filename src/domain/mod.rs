//! Domain layer - Cache entries, policies and the storage abstraction

pub mod cache;
pub mod error;

pub use cache::{CacheEntry, CacheOptions, CachePolicy, CacheStrategy, StorageProvider};
pub use error::DomainError;
