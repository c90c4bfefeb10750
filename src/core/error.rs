//! Error types for modkit.

use thiserror::Error;

/// Result type alias for modkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing modules.
#[derive(Error, Debug)]
pub enum Error {
    // Load / construction errors
    #[error("Module {module_id} failed to load: {reason}")]
    LoadFailed { module_id: String, reason: String },

    #[error("Module {module_id} could not be constructed: {reason}")]
    ConstructFailed { module_id: String, reason: String },

    // Discovery errors
    #[error("Module discovery failed: {0}")]
    Discovery(String),

    // Persistence errors
    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Persisted active set is corrupt: {0}")]
    CorruptActiveSet(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a load failure.
    pub fn load_failed(module_id: &str, reason: impl Into<String>) -> Self {
        Error::LoadFailed {
            module_id: module_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a construction failure.
    pub fn construct_failed(module_id: &str, reason: impl Into<String>) -> Self {
        Error::ConstructFailed {
            module_id: module_id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
