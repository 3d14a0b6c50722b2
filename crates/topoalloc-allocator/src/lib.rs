//! topoalloc-allocator: Topology-aware GPU allocation
//!
//! This crate picks groups of GPUs for a request:
//! - Allocation policies (best-effort link scoring, static DGX groups)
//! - GPU allocation and tracking

pub mod besteffort;
pub mod gpu_allocator;
pub mod policy;
pub mod static_dgx;

pub use besteffort::{pair_score, BestEffortPolicy};
pub use gpu_allocator::{GpuAllocator, GpuDeviceStatus};
pub use policy::{policy_for, Policy};
pub use static_dgx::StaticDgxPolicy;
