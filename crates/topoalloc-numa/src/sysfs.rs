//! Host topology read from sysfs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::discovery::SystemNodeSource;
use crate::{NumaError, NumaResult};

/// Enumerates NUMA nodes from `<root>/devices/system/node/node*`
#[derive(Debug, Clone)]
pub struct SysfsNodeSource {
    root: PathBuf,
}

impl SysfsNodeSource {
    /// Create a source rooted at a sysfs mount, normally `/sys`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsNodeSource {
    fn default() -> Self {
        Self::new("/sys")
    }
}

impl SystemNodeSource for SysfsNodeSource {
    /// Nodes with a non-empty `cpulist`, in ascending order
    fn system_nodes(&self) -> NumaResult<Vec<i32>> {
        let node_dir = self.root.join("devices/system/node");
        let entries = fs::read_dir(&node_dir).map_err(|e| {
            NumaError::SystemNodes(format!("failed to list {}: {}", node_dir.display(), e))
        })?;

        let mut nodes = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix("node"))
                .and_then(|n| n.parse::<i32>().ok())
            else {
                continue;
            };

            let cpulist = fs::read_to_string(entry.path().join("cpulist")).map_err(|e| {
                NumaError::SystemNodes(format!("failed to read CPU list for NUMA node {}: {}", id, e))
            })?;
            if cpulist.trim().is_empty() {
                debug!(node = id, "Skipping NUMA node without CPUs");
                continue;
            }
            nodes.push(id);
        }

        nodes.sort_unstable();
        Ok(nodes)
    }
}

/// Canonical sysfs form of a PCI bus ID.
///
/// NVML reports an 8-digit domain (`00000000:07:00.0`) while sysfs uses four
/// (`0000:07:00.0`).
pub fn normalize_bus_id(bus_id: &str) -> String {
    let lower = bus_id.trim().to_ascii_lowercase();
    match lower.split_once(':') {
        Some((domain, rest)) if domain.len() == 8 && domain.starts_with("0000") => {
            format!("{}:{}", &domain[4..], rest)
        }
        _ => lower,
    }
}

/// NUMA node of a PCI device from `<root>/bus/pci/devices/<bus_id>/numa_node`.
///
/// Returns `None` when the kernel reports no affinity (missing file or a
/// negative node).
pub fn read_pci_numa_node(root: &Path, bus_id: &str) -> NumaResult<Option<i32>> {
    let path = root
        .join("bus/pci/devices")
        .join(normalize_bus_id(bus_id))
        .join("numa_node");

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let node: i32 = content.trim().parse().map_err(|e| NumaError::NumaNode {
        uuid: bus_id.to_string(),
        reason: format!("error parsing value for NUMA node {:?}: {}", content.trim(), e),
    })?;

    Ok((node >= 0).then_some(node))
}
