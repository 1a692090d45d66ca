//! Cache domain - entries, per-call options and the storage abstraction

mod entry;
mod options;
mod storage;
mod strategy;

pub use entry::CacheEntry;
pub use options::{CacheOptions, CachePolicy};
pub use storage::StorageProvider;
pub use strategy::CacheStrategy;

#[cfg(test)]
pub use storage::mock::MockStorage;
