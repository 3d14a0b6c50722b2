//! Topology description files (TOML)
//!
//! A topology file lists the GPUs of a node, their MIG devices and the links
//! between them. Links are declared once per pair and applied in both
//! directions, so a loaded [`DeviceList`] always satisfies the link-count
//! symmetry the allocator relies on.

use crate::{Device, DeviceList, LinkType, TopoallocError, TopoallocResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A whole node topology
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyFile {
    /// GPUs in discovery order
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceEntry>,
    /// Links between pairs of GPUs
    #[serde(default, rename = "link")]
    pub links: Vec<LinkEntry>,
}

/// A GPU in a topology file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub index: usize,
    pub uuid: String,
    pub pci_bus_id: Option<String>,
    /// NUMA node; when absent it is read from sysfs via `pci_bus_id`
    pub numa_node: Option<i32>,
    /// MIG devices carved out of this GPU, in MIG index order
    #[serde(default)]
    pub migs: Vec<MigEntry>,
}

/// A MIG device in a topology file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigEntry {
    pub uuid: String,
}

/// Links between two GPUs, applied in both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEntry {
    pub a: usize,
    pub b: usize,
    pub types: Vec<LinkType>,
}

impl TopologyFile {
    /// Load a topology from a TOML file
    pub fn from_file(path: &Path) -> TopoallocResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TopoallocError::Config(format!(
                "Failed to read topology file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse a topology from TOML text
    pub fn from_toml(content: &str) -> TopoallocResult<Self> {
        toml::from_str(content)
            .map_err(|e| TopoallocError::Config(format!("Failed to parse topology: {}", e)))
    }

    /// Build the device list, ordered by index.
    ///
    /// Indices must be unique and contiguous from zero; link endpoints must
    /// name two different known devices.
    pub fn device_list(&self) -> TopoallocResult<DeviceList> {
        let mut entries: Vec<&DeviceEntry> = self.devices.iter().collect();
        entries.sort_by_key(|d| d.index);

        let mut uuids = HashSet::new();
        for (position, entry) in entries.iter().enumerate() {
            if entry.index != position {
                return Err(TopoallocError::Topology(format!(
                    "device indices must be unique and contiguous from 0, found {} at position {}",
                    entry.index, position
                )));
            }
            if let Some(node) = entry.numa_node.filter(|n| *n < 0) {
                return Err(TopoallocError::Topology(format!(
                    "device {} has negative NUMA node {}",
                    entry.index, node
                )));
            }
            let mig_uuids = entry.migs.iter().map(|m| m.uuid.as_str());
            for uuid in std::iter::once(entry.uuid.as_str()).chain(mig_uuids) {
                if !uuids.insert(uuid) {
                    return Err(TopoallocError::Topology(format!(
                        "duplicate device uuid {}",
                        uuid
                    )));
                }
            }
        }

        let mut devices: Vec<Device> = entries
            .iter()
            .map(|entry| Device {
                index: entry.index,
                uuid: entry.uuid.clone(),
                pci_bus_id: entry.pci_bus_id.clone(),
                links: Default::default(),
            })
            .collect();

        for link in &self.links {
            if link.a == link.b || link.a >= devices.len() || link.b >= devices.len() {
                return Err(TopoallocError::Topology(format!(
                    "invalid link between devices {} and {}",
                    link.a, link.b
                )));
            }
            for link_type in &link.types {
                crate::connect(&mut devices, link.a, link.b, *link_type);
            }
        }

        Ok(DeviceList::new(devices))
    }
}
