use thiserror::Error;

/// Core domain errors
///
/// `Clone` so a single producer failure can be handed to every caller
/// sharing an in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Producer error: {source_name} - {message}")]
    Producer {
        source_name: String,
        message: String,
    },
}

impl DomainError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn producer(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Producer {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}
