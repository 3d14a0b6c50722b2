//! GPU allocator for tracking and assigning GPU devices

use std::collections::BTreeSet;

use topoalloc_core::{Device, DeviceList, TopoallocError, TopoallocResult};
use tracing::{debug, info};

use crate::policy::Policy;

/// GPU allocator that tracks GPU device assignments made through a policy
pub struct GpuAllocator {
    /// All GPU devices on the node
    devices: DeviceList,
    /// Allocation policy
    policy: Box<dyn Policy>,
    /// Indices of allocated GPUs
    allocated: BTreeSet<usize>,
}

impl GpuAllocator {
    /// Create a new allocator over a device list
    pub fn new(devices: DeviceList, policy: Box<dyn Policy>) -> Self {
        info!(
            gpus = devices.len(),
            policy = policy.name(),
            "GPU allocator initialized"
        );
        Self {
            devices,
            policy,
            allocated: BTreeSet::new(),
        }
    }

    /// Get the total number of GPUs
    pub fn total_count(&self) -> usize {
        self.devices.len()
    }

    /// Get the number of GPUs not yet allocated
    pub fn available_count(&self) -> usize {
        self.devices.len() - self.allocated.len()
    }

    /// Devices not yet allocated, ordered by index
    pub fn remaining(&self) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|d| !self.allocated.contains(&d.index))
            .collect()
    }

    /// Allocate `count` GPUs chosen by the policy from the remaining ones.
    ///
    /// Returns the indices of the allocated GPUs.
    pub fn allocate(&mut self, count: usize) -> TopoallocResult<Vec<usize>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let chosen: Vec<usize> = {
            let remaining = self.remaining();
            self.policy
                .allocate(&remaining, &[], count)
                .iter()
                .map(|d| d.index)
                .collect()
        };

        if chosen.is_empty() {
            return Err(TopoallocError::Allocation(format!(
                "unable to allocate {} GPUs: {} remaining",
                count,
                self.available_count()
            )));
        }

        if let Err(e) = self.allocate_specific(&chosen) {
            panic!("Internal error while allocating GPUs: {}", e);
        }

        Ok(chosen)
    }

    /// Allocate a specific set of GPUs by index.
    ///
    /// Fails without allocating anything if any of them is unknown or
    /// already allocated.
    pub fn allocate_specific(&mut self, indices: &[usize]) -> TopoallocResult<()> {
        let unavailable: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|i| *i >= self.devices.len() || self.allocated.contains(i))
            .collect();

        if !unavailable.is_empty() {
            let available: Vec<usize> = self.remaining().iter().map(|d| d.index).collect();
            return Err(TopoallocError::Allocation(format!(
                "devices {:?} are unavailable for allocation, available: {:?}",
                unavailable, available
            )));
        }

        self.allocated.extend(indices.iter().copied());
        info!(gpus = ?indices, "Allocated GPUs");
        Ok(())
    }

    /// Release previously allocated GPUs
    pub fn free(&mut self, indices: &[usize]) {
        for idx in indices {
            if self.allocated.remove(idx) {
                debug!(gpu = idx, "Released GPU");
            }
        }
    }

    /// Run the policy over the given UUIDs without reserving anything.
    ///
    /// Every UUID must name a known device. Returns the UUIDs of the chosen
    /// devices, or an empty list when the request cannot be satisfied.
    pub fn preferred_allocation(
        &self,
        available: &[String],
        required: &[String],
        size: usize,
    ) -> TopoallocResult<Vec<String>> {
        let available_devices = self.devices.filter(Some(available)).map_err(|e| {
            TopoallocError::Allocation(format!(
                "unable to retrieve list of available devices: {}",
                e
            ))
        })?;
        let required_devices = self.devices.filter(Some(required)).map_err(|e| {
            TopoallocError::Allocation(format!(
                "unable to retrieve list of required devices: {}",
                e
            ))
        })?;

        let chosen = self
            .policy
            .allocate(&available_devices, &required_devices, size);
        debug!(
            size,
            required = required.len(),
            chosen = chosen.len(),
            "Computed preferred allocation"
        );

        Ok(chosen.iter().map(|d| d.uuid.clone()).collect())
    }

    /// Get information about all GPUs
    pub fn device_status(&self) -> Vec<GpuDeviceStatus<'_>> {
        self.devices
            .iter()
            .map(|d| GpuDeviceStatus {
                device: d,
                allocated: self.allocated.contains(&d.index),
            })
            .collect()
    }
}

/// GPU device with allocation status
#[derive(Debug, Clone)]
pub struct GpuDeviceStatus<'a> {
    /// Device information
    pub device: &'a Device,
    /// Whether this device is currently allocated
    pub allocated: bool,
}
