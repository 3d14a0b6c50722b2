//! Error types for NUMA resolution

use thiserror::Error;

/// Errors raised while resolving NUMA placement
#[derive(Error, Debug)]
pub enum NumaError {
    /// The topology cache was queried before it was initialized
    #[error("NUMA topology not initialized")]
    NotInitialized,

    /// Enumerating the system NUMA nodes failed
    #[error("failed to get system NUMA nodes: {0}")]
    SystemNodes(String),

    /// Enumerating the GPU and MIG devices failed
    #[error("failed to get devices: {0}")]
    Discovery(String),

    /// An assigned device is not present on the node
    #[error("device with UUID {0} not found")]
    DeviceNotFound(String),

    /// The NUMA node of a device could not be determined
    #[error("failed to get NUMA node for device {uuid}: {reason}")]
    NumaNode { uuid: String, reason: String },

    /// A node list such as `0-3,5` could not be parsed
    #[error("failed to parse NUMA nodes from {input:?}: {reason}")]
    InvalidNodeList { input: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for NUMA resolution
pub type NumaResult<T> = Result<T, NumaError>;

impl From<topoalloc_core::TopoallocError> for NumaError {
    fn from(err: topoalloc_core::TopoallocError) -> Self {
        NumaError::Discovery(err.to_string())
    }
}
