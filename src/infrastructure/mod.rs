//! Infrastructure layer - storage backends, producers and the coordinator

pub mod cache;
pub mod http;
pub mod logging;
pub mod services;
