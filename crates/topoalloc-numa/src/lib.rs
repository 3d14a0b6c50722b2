//! topoalloc-numa: NUMA placement for GPU containers
//!
//! This crate resolves the NUMA nodes a container's memory should be
//! constrained to:
//! - System NUMA node enumeration from sysfs
//! - Device UUID to NUMA node cache
//! - Visible-devices parsing
//! - Create/update container hooks

pub mod cache;
pub mod container;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod nodelist;
pub mod static_discoverer;
pub mod sysfs;

pub use cache::NumaTopologyCache;
pub use container::Container;
pub use discovery::{
    resolve_visible_devices, DeviceDiscoverer, DeviceHandle, DeviceMap, SystemNodeSource,
    VISIBLE_DEVICES_ENV,
};
pub use error::{NumaError, NumaResult};
pub use filter::NumaFilter;
pub use static_discoverer::{StaticDevice, StaticDiscoverer};
pub use sysfs::SysfsNodeSource;
