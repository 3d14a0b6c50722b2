//! Process-wide NUMA topology cache

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::discovery::{DeviceDiscoverer, SystemNodeSource};
use crate::{nodelist, Container, NumaError, NumaResult};

/// System NUMA nodes plus the NUMA node of every device seen so far.
///
/// Device entries are added on first lookup and never removed: a device's
/// NUMA affinity does not change while the process runs.
pub struct NumaTopologyCache {
    /// NUMA nodes that have CPUs, ascending
    system_nodes: Vec<i32>,
    /// Device UUID (GPU or MIG) to NUMA node
    device_nodes: Mutex<HashMap<String, i32>>,
}

impl NumaTopologyCache {
    /// Enumerate the system NUMA nodes and resolve every known device
    pub fn initialize(
        system: &dyn SystemNodeSource,
        discoverer: &dyn DeviceDiscoverer,
    ) -> NumaResult<Self> {
        let system_nodes = system.system_nodes()?;
        debug!(nodes = ?system_nodes, "Discovered system NUMA nodes");

        let devices = discoverer.all_devices()?;
        let mut device_nodes = HashMap::with_capacity(devices.len());
        for (uuid, device) in &devices {
            let node = device.numa_node()?;
            debug!(device_uuid = %uuid, numa_node = node, "Added device to NUMA topology");
            device_nodes.insert(uuid.clone(), node);
        }

        info!(
            system_nodes = %nodelist::format(&system_nodes),
            devices = device_nodes.len(),
            "NUMA topology initialized"
        );

        Ok(Self::from_parts(system_nodes, device_nodes))
    }

    /// Build a cache from already known nodes
    pub fn from_parts(system_nodes: Vec<i32>, device_nodes: HashMap<String, i32>) -> Self {
        Self {
            system_nodes,
            device_nodes: Mutex::new(device_nodes),
        }
    }

    /// NUMA nodes that have CPUs
    pub fn system_nodes(&self) -> &[i32] {
        &self.system_nodes
    }

    /// Cached NUMA node of a device, without any lookup
    pub fn cached_node(&self, uuid: &str) -> Option<i32> {
        self.lock().get(uuid).copied()
    }

    /// Number of cached devices
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// NUMA nodes of the given devices, in the same order.
    ///
    /// Cache misses trigger a single device enumeration; the nodes found are
    /// cached. An unknown UUID fails the whole lookup. The lock is held for
    /// the whole call, so concurrent misses for one device resolve it once.
    pub fn device_nodes(
        &self,
        uuids: &[String],
        discoverer: &dyn DeviceDiscoverer,
    ) -> NumaResult<Vec<i32>> {
        let mut cache = self.lock();

        let mut nodes: Vec<Option<i32>> = uuids.iter().map(|u| cache.get(u).copied()).collect();
        if nodes.iter().all(Option::is_some) {
            return Ok(nodes.into_iter().flatten().collect());
        }

        let devices = discoverer.all_devices()?;
        for (uuid, slot) in uuids.iter().zip(nodes.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            // The same UUID may be listed twice.
            if let Some(node) = cache.get(uuid) {
                *slot = Some(*node);
                continue;
            }

            let device = devices
                .get(uuid)
                .ok_or_else(|| NumaError::DeviceNotFound(uuid.clone()))?;
            let node = device.numa_node()?;
            info!(device_uuid = %uuid, numa_node = node, "Cached NUMA node for new device");
            cache.insert(uuid.clone(), node);
            *slot = Some(node);
        }

        Ok(nodes.into_iter().flatten().collect())
    }

    /// NUMA nodes a container should be constrained to, as decimal strings.
    ///
    /// The container's current constraint, restricted to system nodes, comes
    /// first; if nothing of it remains every system node is used instead.
    /// The nodes of its assigned devices follow. Duplicates are kept.
    pub fn resolve_container_nodes(
        &self,
        container: &Container,
        discoverer: &dyn DeviceDiscoverer,
    ) -> NumaResult<Vec<String>> {
        let mut nodes: Vec<i32> = Vec::new();
        if let Some(mems) = &container.mems {
            for node in nodelist::parse(mems)? {
                if self.system_nodes.contains(&node) {
                    nodes.push(node);
                } else {
                    debug!(container = %container.id, node, "Dropping unknown NUMA node");
                }
            }
        }

        if nodes.is_empty() {
            nodes.extend_from_slice(&self.system_nodes);
        }

        let uuids = discoverer.assigned_devices(container)?;
        nodes.extend(self.device_nodes(&uuids, discoverer)?);

        debug!(
            container = %container.id,
            devices = ?uuids,
            nodes = ?nodes,
            "Resolved container NUMA nodes"
        );

        Ok(nodes.iter().map(|n| n.to_string()).collect())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, i32>> {
        // Entries are only ever inserted whole, so a poisoned map is intact.
        self.device_nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
