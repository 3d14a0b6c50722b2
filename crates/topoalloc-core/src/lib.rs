//! topoalloc-core: Core types for topoalloc
//!
//! This crate provides the fundamental types used throughout topoalloc:
//! - GPU devices and point-to-point link types
//! - Topology description files
//! - Configuration types
//! - Error handling

pub mod config;
pub mod device;
pub mod error;
pub mod link;
pub mod topology;

pub use config::*;
pub use device::*;
pub use error::*;
pub use link::*;
pub use topology::*;
