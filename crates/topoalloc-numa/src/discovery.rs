//! Device discovery and system NUMA enumeration interfaces

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::{Container, NumaError, NumaResult};

/// Environment variable naming the devices visible to a container
pub const VISIBLE_DEVICES_ENV: &str = "NVIDIA_VISIBLE_DEVICES";

/// A GPU or MIG device that can report its NUMA node
pub trait DeviceHandle: Send + Sync {
    /// Device UUID
    fn uuid(&self) -> &str;

    /// Device index: `"<gpu>"` for a GPU, `"<gpu>:<mig>"` for a MIG device
    fn index(&self) -> &str;

    /// NUMA node the device is attached to
    fn numa_node(&self) -> NumaResult<i32>;
}

/// All devices on the node, keyed by UUID
pub type DeviceMap = HashMap<String, Arc<dyn DeviceHandle>>;

/// Discovers the devices on the node and the devices assigned to containers
pub trait DeviceDiscoverer: Send + Sync {
    /// Every GPU and MIG device on the node
    fn all_devices(&self) -> NumaResult<DeviceMap>;

    /// UUIDs of the devices assigned to a container, read from its
    /// visible-devices environment variable
    fn assigned_devices(&self, container: &Container) -> NumaResult<Vec<String>> {
        match container.env_value(VISIBLE_DEVICES_ENV) {
            Some(value) => resolve_visible_devices(self, value),
            None => Ok(Vec::new()),
        }
    }
}

/// Source of the system NUMA nodes that have CPUs
pub trait SystemNodeSource: Send + Sync {
    fn system_nodes(&self) -> NumaResult<Vec<i32>>;
}

/// Turn a visible-devices value into device UUIDs.
///
/// `""`, `"void"` and `"none"` select nothing and `"all"` selects every
/// device. Otherwise the value is a comma-separated list where `"<gpu>"` and
/// `"<gpu>:<mig>"` indices are mapped to UUIDs and any other entry is taken
/// to be a UUID already.
pub fn resolve_visible_devices<D>(discoverer: &D, value: &str) -> NumaResult<Vec<String>>
where
    D: DeviceDiscoverer + ?Sized,
{
    match value.trim() {
        "" | "void" | "none" => Ok(Vec::new()),
        "all" => {
            let devices = discoverer.all_devices()?;
            let mut handles: Vec<&Arc<dyn DeviceHandle>> = devices.values().collect();
            handles.sort_by_key(|d| index_sort_key(d.index()));
            Ok(handles.iter().map(|d| d.uuid().to_string()).collect())
        }
        list => {
            let ids: Vec<&str> = list
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .collect();

            // Only enumerate devices when an index has to be translated.
            let devices = if ids.iter().any(|id| is_index(id)) {
                discoverer.all_devices()?
            } else {
                DeviceMap::new()
            };

            let uuids = ids
                .iter()
                .map(|id| {
                    if !is_index(id) {
                        return Ok(id.to_string());
                    }
                    devices
                        .values()
                        .find(|d| d.index() == *id)
                        .map(|d| d.uuid().to_string())
                        .ok_or_else(|| NumaError::DeviceNotFound(id.to_string()))
                })
                .collect::<NumaResult<Vec<_>>>()?;

            debug!(value = list, devices = ?uuids, "Resolved visible devices");
            Ok(uuids)
        }
    }
}

/// `"3"` or `"3:1"`
fn is_index(id: &str) -> bool {
    let mut parts = id.splitn(2, ':');
    let gpu = parts.next().unwrap_or_default();
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    numeric(gpu) && parts.next().map_or(true, numeric)
}

fn index_sort_key(index: &str) -> (u32, Option<u32>) {
    let mut parts = index.splitn(2, ':');
    let gpu = parts
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(u32::MAX);
    let mig = parts.next().and_then(|s| s.parse().ok());
    (gpu, mig)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDevice {
        uuid: String,
        index: String,
    }

    impl DeviceHandle for FakeDevice {
        fn uuid(&self) -> &str {
            &self.uuid
        }

        fn index(&self) -> &str {
            &self.index
        }

        fn numa_node(&self) -> NumaResult<i32> {
            Ok(0)
        }
    }

    struct FakeDiscoverer;

    impl DeviceDiscoverer for FakeDiscoverer {
        fn all_devices(&self) -> NumaResult<DeviceMap> {
            let devices = [
                ("GPU-b", "1"),
                ("GPU-a", "0"),
                ("MIG-a1", "0:1"),
                ("MIG-a0", "0:0"),
            ];
            Ok(devices
                .iter()
                .map(|(uuid, index)| {
                    let handle: Arc<dyn DeviceHandle> = Arc::new(FakeDevice {
                        uuid: uuid.to_string(),
                        index: index.to_string(),
                    });
                    (uuid.to_string(), handle)
                })
                .collect())
        }
    }

    struct FailingDiscoverer;

    impl DeviceDiscoverer for FailingDiscoverer {
        fn all_devices(&self) -> NumaResult<DeviceMap> {
            Err(NumaError::Discovery("driver not loaded".to_string()))
        }
    }

    #[test]
    fn test_empty_selections() {
        for value in ["", "void", "none", " "] {
            assert!(resolve_visible_devices(&FakeDiscoverer, value)
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn test_all_devices_in_index_order() {
        let uuids = resolve_visible_devices(&FakeDiscoverer, "all").unwrap();
        assert_eq!(uuids, vec!["GPU-a", "MIG-a0", "MIG-a1", "GPU-b"]);
    }

    #[test]
    fn test_mixed_list() {
        let uuids = resolve_visible_devices(&FakeDiscoverer, "1,0:1,GPU-zzz").unwrap();
        assert_eq!(uuids, vec!["GPU-b", "MIG-a1", "GPU-zzz"]);
    }

    #[test]
    fn test_uuid_list_skips_discovery() {
        let uuids = resolve_visible_devices(&FailingDiscoverer, "GPU-a,GPU-b").unwrap();
        assert_eq!(uuids, vec!["GPU-a", "GPU-b"]);
    }

    #[test]
    fn test_unknown_index() {
        let err = resolve_visible_devices(&FakeDiscoverer, "0,7").unwrap_err();
        assert!(matches!(err, NumaError::DeviceNotFound(ref id) if id == "7"));
    }

    #[test]
    fn test_discovery_failure_propagates() {
        assert!(resolve_visible_devices(&FailingDiscoverer, "all").is_err());
        assert!(resolve_visible_devices(&FailingDiscoverer, "0").is_err());
    }

    #[test]
    fn test_assigned_devices_from_env() {
        let container = Container::new("c1").with_env(VISIBLE_DEVICES_ENV, "0:0");
        assert_eq!(
            FakeDiscoverer.assigned_devices(&container).unwrap(),
            vec!["MIG-a0"]
        );

        let container = Container::new("c2");
        assert!(FakeDiscoverer.assigned_devices(&container).unwrap().is_empty());
    }

    #[test]
    fn test_is_index() {
        assert!(is_index("0"));
        assert!(is_index("12:3"));
        assert!(!is_index("GPU-1"));
        assert!(!is_index("1:"));
        assert!(!is_index(":1"));
        assert!(!is_index("MIG-GPU-1/1/0"));
    }
}
