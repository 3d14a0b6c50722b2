//! Point-to-point link types between GPU devices

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest number of parallel NVLinks scored between two devices.
pub const MAX_NVLINKS: u8 = 12;

/// Nature of a link between two devices.
///
/// PCIe variants describe the closest common ancestor in the PCIe hierarchy,
/// `NvLink(k)` describes `k` parallel NVLink connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LinkType {
    /// Devices hang off different CPU sockets
    CrossCpu,
    /// Devices share a CPU socket
    SameCpu,
    /// Devices share a host bridge
    HostBridge,
    /// Devices are separated by multiple PCIe switches
    MultiSwitch,
    /// Devices share a single PCIe switch
    SingleSwitch,
    /// Devices sit on the same board
    SameBoard,
    /// `k` NVLinks, valid for `1..=MAX_NVLINKS`. Only [`LinkType::nvlink`]
    /// and parsing enforce the range; [`LinkType::points`] caps the count.
    NvLink(u8),
}

impl LinkType {
    /// Build an NVLink variant, rejecting counts outside `1..=MAX_NVLINKS`
    pub fn nvlink(count: u8) -> Option<Self> {
        (1..=MAX_NVLINKS)
            .contains(&count)
            .then_some(LinkType::NvLink(count))
    }

    /// Point value used when scoring a pair of devices
    pub fn points(&self) -> u32 {
        match self {
            LinkType::CrossCpu => 10,
            LinkType::SameCpu => 20,
            LinkType::HostBridge => 30,
            LinkType::MultiSwitch => 40,
            LinkType::SingleSwitch => 50,
            LinkType::SameBoard => 60,
            LinkType::NvLink(count) => 100 * u32::from((*count).min(MAX_NVLINKS)),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkType::CrossCpu => write!(f, "cross-cpu"),
            LinkType::SameCpu => write!(f, "same-cpu"),
            LinkType::HostBridge => write!(f, "host-bridge"),
            LinkType::MultiSwitch => write!(f, "multi-switch"),
            LinkType::SingleSwitch => write!(f, "single-switch"),
            LinkType::SameBoard => write!(f, "same-board"),
            LinkType::NvLink(count) => write!(f, "nvlink-{}", count),
        }
    }
}

impl FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cross-cpu" => Ok(LinkType::CrossCpu),
            "same-cpu" => Ok(LinkType::SameCpu),
            "host-bridge" => Ok(LinkType::HostBridge),
            "multi-switch" => Ok(LinkType::MultiSwitch),
            "single-switch" => Ok(LinkType::SingleSwitch),
            "same-board" => Ok(LinkType::SameBoard),
            other => {
                let count = other
                    .strip_prefix("nvlink-")
                    .and_then(|n| n.parse::<u8>().ok())
                    .ok_or_else(|| format!("unknown link type {:?}", other))?;
                LinkType::nvlink(count).ok_or_else(|| {
                    format!("nvlink count {} outside 1..={}", count, MAX_NVLINKS)
                })
            }
        }
    }
}

impl TryFrom<String> for LinkType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LinkType> for String {
    fn from(link: LinkType) -> Self {
        link.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_table() {
        assert_eq!(LinkType::CrossCpu.points(), 10);
        assert_eq!(LinkType::SameCpu.points(), 20);
        assert_eq!(LinkType::HostBridge.points(), 30);
        assert_eq!(LinkType::MultiSwitch.points(), 40);
        assert_eq!(LinkType::SingleSwitch.points(), 50);
        assert_eq!(LinkType::SameBoard.points(), 60);
        for k in 1..=MAX_NVLINKS {
            assert_eq!(LinkType::NvLink(k).points(), 100 * u32::from(k));
        }
    }

    #[test]
    fn test_out_of_range_nvlink_points_are_capped() {
        assert_eq!(LinkType::NvLink(0).points(), 0);
        assert_eq!(LinkType::NvLink(200).points(), 100 * u32::from(MAX_NVLINKS));
    }

    #[test]
    fn test_nvlink_bounds() {
        assert!(LinkType::nvlink(0).is_none());
        assert_eq!(LinkType::nvlink(12), Some(LinkType::NvLink(12)));
        assert!(LinkType::nvlink(13).is_none());
    }

    #[test]
    fn test_parse_link_types() {
        assert_eq!("same-board".parse::<LinkType>(), Ok(LinkType::SameBoard));
        assert_eq!("nvlink-4".parse::<LinkType>(), Ok(LinkType::NvLink(4)));
        assert!("nvlink-18".parse::<LinkType>().is_err());
        assert!("pcie".parse::<LinkType>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        let link = LinkType::NvLink(2);
        assert_eq!(link.to_string(), "nvlink-2");
        assert_eq!(link.to_string().parse::<LinkType>(), Ok(link));
    }
}
