//! Device discovery backed by a topology file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use topoalloc_core::{TopologyFile, TopoallocResult};

use crate::discovery::{resolve_visible_devices, DeviceDiscoverer, DeviceHandle, DeviceMap};
use crate::sysfs::read_pci_numa_node;
use crate::{Container, NumaError, NumaResult};

/// Where a device's NUMA node comes from
#[derive(Debug, Clone)]
enum NumaSource {
    Fixed(i32),
    Pci { sysfs_root: PathBuf, bus_id: String },
    Unknown,
}

/// A GPU or MIG device declared in a topology file
#[derive(Debug, Clone)]
pub struct StaticDevice {
    uuid: String,
    index: String,
    numa: NumaSource,
}

impl DeviceHandle for StaticDevice {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn index(&self) -> &str {
        &self.index
    }

    fn numa_node(&self) -> NumaResult<i32> {
        let unavailable = |reason: &str| NumaError::NumaNode {
            uuid: self.uuid.clone(),
            reason: reason.to_string(),
        };

        match &self.numa {
            NumaSource::Fixed(node) if *node >= 0 => Ok(*node),
            NumaSource::Fixed(_) => Err(unavailable("negative NUMA node in topology")),
            NumaSource::Pci { sysfs_root, bus_id } => read_pci_numa_node(sysfs_root, bus_id)?
                .ok_or_else(|| unavailable("no NUMA affinity reported by sysfs")),
            NumaSource::Unknown => Err(unavailable("neither a NUMA node nor a PCI bus ID is known")),
        }
    }
}

/// Discoverer over the devices of a topology file.
///
/// MIG devices share the NUMA node of their parent GPU. GPUs without an
/// explicit node are looked up in sysfs through their PCI bus ID.
#[derive(Debug, Clone)]
pub struct StaticDiscoverer {
    devices: Vec<StaticDevice>,
    visible_devices_env: String,
}

impl StaticDiscoverer {
    pub fn new(topology: &TopologyFile, sysfs_root: &Path, visible_devices_env: &str) -> Self {
        let mut devices = Vec::new();
        for gpu in &topology.devices {
            let numa = match (gpu.numa_node, &gpu.pci_bus_id) {
                (Some(node), _) => NumaSource::Fixed(node),
                (None, Some(bus_id)) => NumaSource::Pci {
                    sysfs_root: sysfs_root.to_path_buf(),
                    bus_id: bus_id.clone(),
                },
                (None, None) => NumaSource::Unknown,
            };

            devices.push(StaticDevice {
                uuid: gpu.uuid.clone(),
                index: gpu.index.to_string(),
                numa: numa.clone(),
            });
            for (mig_index, mig) in gpu.migs.iter().enumerate() {
                devices.push(StaticDevice {
                    uuid: mig.uuid.clone(),
                    index: format!("{}:{}", gpu.index, mig_index),
                    numa: numa.clone(),
                });
            }
        }

        Self {
            devices,
            visible_devices_env: visible_devices_env.to_string(),
        }
    }

    /// Load a topology file and build a discoverer over it
    pub fn from_file(
        path: &Path,
        sysfs_root: &Path,
        visible_devices_env: &str,
    ) -> TopoallocResult<Self> {
        let topology = TopologyFile::from_file(path)?;
        // Reject malformed topologies up front.
        topology.device_list()?;
        Ok(Self::new(&topology, sysfs_root, visible_devices_env))
    }
}

impl DeviceDiscoverer for StaticDiscoverer {
    fn all_devices(&self) -> NumaResult<DeviceMap> {
        Ok(self
            .devices
            .iter()
            .map(|d| {
                let handle: Arc<dyn DeviceHandle> = Arc::new(d.clone());
                (d.uuid.clone(), handle)
            })
            .collect())
    }

    fn assigned_devices(&self, container: &Container) -> NumaResult<Vec<String>> {
        match container.env_value(&self.visible_devices_env) {
            Some(value) => resolve_visible_devices(self, value),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TOPOLOGY: &str = r#"
[[device]]
index = 0
uuid = "GPU-0"
numa_node = 0
migs = [{ uuid = "MIG-0-0" }, { uuid = "MIG-0-1" }]

[[device]]
index = 1
uuid = "GPU-1"
pci_bus_id = "00000000:41:00.0"

[[device]]
index = 2
uuid = "GPU-2"
"#;

    fn discoverer(sysfs: &Path) -> StaticDiscoverer {
        let topology = TopologyFile::from_toml(TOPOLOGY).unwrap();
        StaticDiscoverer::new(&topology, sysfs, "NVIDIA_VISIBLE_DEVICES")
    }

    #[test]
    fn test_all_devices_include_migs() {
        let dir = TempDir::new().unwrap();
        let devices = discoverer(dir.path()).all_devices().unwrap();

        assert_eq!(devices.len(), 5);
        assert_eq!(devices["MIG-0-1"].index(), "0:1");
        assert_eq!(devices["MIG-0-1"].numa_node().unwrap(), 0);
    }

    #[test]
    fn test_numa_node_from_sysfs() {
        let dir = TempDir::new().unwrap();
        let node_file = dir.path().join("bus/pci/devices/0000:41:00.0/numa_node");
        fs::create_dir_all(node_file.parent().unwrap()).unwrap();
        fs::write(&node_file, "1\n").unwrap();

        let devices = discoverer(dir.path()).all_devices().unwrap();
        assert_eq!(devices["GPU-1"].numa_node().unwrap(), 1);
    }

    #[test]
    fn test_numa_node_unavailable() {
        let dir = TempDir::new().unwrap();
        let devices = discoverer(dir.path()).all_devices().unwrap();

        assert!(matches!(
            devices["GPU-1"].numa_node(),
            Err(NumaError::NumaNode { .. })
        ));
        assert!(devices["GPU-2"].numa_node().is_err());
    }

    #[test]
    fn test_negative_numa_node() {
        let dir = TempDir::new().unwrap();
        let topology = TopologyFile::from_toml(
            r#"
[[device]]
index = 0
uuid = "GPU-0"
numa_node = -1
"#,
        )
        .unwrap();
        let devices = StaticDiscoverer::new(&topology, dir.path(), "NVIDIA_VISIBLE_DEVICES")
            .all_devices()
            .unwrap();
        assert!(matches!(
            devices["GPU-0"].numa_node(),
            Err(NumaError::NumaNode { .. })
        ));

        let path = dir.path().join("topology.toml");
        fs::write(&path, "[[device]]\nindex = 0\nuuid = \"GPU-0\"\nnuma_node = -1\n").unwrap();
        assert!(StaticDiscoverer::from_file(&path, dir.path(), "NVIDIA_VISIBLE_DEVICES").is_err());
    }

    #[test]
    fn test_custom_visible_devices_env() {
        let dir = TempDir::new().unwrap();
        let topology = TopologyFile::from_toml(TOPOLOGY).unwrap();
        let discoverer = StaticDiscoverer::new(&topology, dir.path(), "GPU_DEVICES");

        let container = Container::new("c1")
            .with_env("NVIDIA_VISIBLE_DEVICES", "1")
            .with_env("GPU_DEVICES", "0:0");
        assert_eq!(
            discoverer.assigned_devices(&container).unwrap(),
            vec!["MIG-0-0"]
        );
    }
}
