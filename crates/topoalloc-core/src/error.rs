//! Error types for topoalloc

use thiserror::Error;

/// Main error type for topoalloc
#[derive(Error, Debug)]
pub enum TopoallocError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed topology description
    #[error("Topology error: {0}")]
    Topology(String),

    /// No device with the given UUID
    #[error("no device with uuid: {0}")]
    DeviceNotFound(String),

    /// Devices could not be reserved
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for topoalloc operations
pub type TopoallocResult<T> = Result<T, TopoallocError>;

impl From<serde_json::Error> for TopoallocError {
    fn from(err: serde_json::Error) -> Self {
        TopoallocError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for TopoallocError {
    fn from(err: toml::de::Error) -> Self {
        TopoallocError::Config(err.to_string())
    }
}
