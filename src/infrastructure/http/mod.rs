//! HTTP producers

mod producer;

pub use producer::HttpProducer;
