//! Infrastructure services

mod cache_coordinator;
mod single_flight;

pub use cache_coordinator::{CacheCoordinator, ObserveStream};
pub use single_flight::{SharedFetch, SingleFlight};
