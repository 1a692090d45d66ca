//! Cache Observer
//!
//! Memoizes single-shot async producers behind a pluggable storage and
//! exposes the outcome as a stream of at most two values:
//! - a cached value, served alone while fresh or as a provisional result
//! - the freshly produced value, unless it duplicates the cached one
//!
//! Storage is an in-process map by default, with Redis available through
//! [`infrastructure::cache::StorageFactory`].

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{
    CacheEntry, CacheOptions, CachePolicy, CacheStrategy, DomainError, StorageProvider,
};
pub use infrastructure::cache::{InMemoryStorage, StorageConfig, StorageFactory};
pub use infrastructure::services::{CacheCoordinator, ObserveStream};
