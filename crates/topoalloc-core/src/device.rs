//! GPU devices and their link topology

use crate::{LinkType, TopoallocError, TopoallocResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A GPU device together with its point-to-point links.
///
/// Two devices are the same device when their indices match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Position in discovery order
    pub index: usize,
    /// Device UUID
    pub uuid: String,
    /// PCI bus ID, if known
    pub pci_bus_id: Option<String>,
    /// Links to peer devices, keyed by peer index
    pub links: BTreeMap<usize, Vec<LinkType>>,
}

impl Device {
    /// Create a device with no links
    pub fn new(index: usize, uuid: impl Into<String>) -> Self {
        Self {
            index,
            uuid: uuid.into(),
            pci_bus_id: None,
            links: BTreeMap::new(),
        }
    }

    /// Links from this device to the peer with the given index
    pub fn links_to(&self, peer: usize) -> &[LinkType] {
        self.links.get(&peer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `other` is the same physical device
    pub fn is(&self, other: &Device) -> bool {
        self.index == other.index
    }

    /// Multi-line description of the device and its links
    pub fn details(&self) -> String {
        let mut s = format!("Device {}:\n", self.index);
        s.push_str(&format!("  UUID: {}\n", self.uuid));
        if let Some(bus_id) = &self.pci_bus_id {
            s.push_str(&format!("  PCI BusID: {}\n", bus_id));
        }
        s.push_str("  Topology:");
        for (peer, links) in &self.links {
            s.push_str(&format!("\n    GPU {} Links:", peer));
            for link in links {
                s.push_str(&format!("\n      {}", link));
            }
        }
        s
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index)
    }
}

/// Add a link in both directions between two devices of a list
pub fn connect(devices: &mut [Device], a: usize, b: usize, link: LinkType) {
    devices[a].links.entry(b).or_default().push(link);
    devices[b].links.entry(a).or_default().push(link);
}

/// Ordered list of devices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceList(pub Vec<Device>);

impl DeviceList {
    pub fn new(devices: Vec<Device>) -> Self {
        Self(devices)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Device> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow every device in order
    pub fn refs(&self) -> Vec<&Device> {
        self.0.iter().collect()
    }

    /// Select the devices with the given UUIDs, in the order requested.
    ///
    /// `None` selects every device. Every UUID must exist in the list.
    pub fn filter(&self, uuids: Option<&[String]>) -> TopoallocResult<Vec<&Device>> {
        let Some(uuids) = uuids else {
            return Ok(self.refs());
        };

        uuids
            .iter()
            .map(|uuid| {
                self.0
                    .iter()
                    .find(|d| &d.uuid == uuid)
                    .ok_or_else(|| TopoallocError::DeviceNotFound(uuid.clone()))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a DeviceList {
    type Item = &'a Device;
    type IntoIter = std::slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Set of unique devices keyed by UUID
#[derive(Debug, Clone, Default)]
pub struct DeviceSet<'a> {
    devices: HashMap<&'a str, &'a Device>,
}

impl<'a> DeviceSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from the given devices
    pub fn from_devices(devices: &[&'a Device]) -> Self {
        let mut set = Self::new();
        set.insert(devices);
        set
    }

    pub fn insert(&mut self, devices: &[&'a Device]) {
        for device in devices {
            self.devices.insert(device.uuid.as_str(), device);
        }
    }

    pub fn remove(&mut self, devices: &[&Device]) {
        for device in devices {
            self.devices.remove(device.uuid.as_str());
        }
    }

    pub fn contains(&self, device: &Device) -> bool {
        self.devices.contains_key(device.uuid.as_str())
    }

    pub fn contains_all(&self, devices: &[&Device]) -> bool {
        devices.len() <= self.devices.len() && devices.iter().all(|d| self.contains(d))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices ordered by index
    pub fn sorted(&self) -> Vec<&'a Device> {
        let mut devices: Vec<&'a Device> = self.devices.values().copied().collect();
        devices.sort_by_key(|d| d.index);
        devices
    }
}
