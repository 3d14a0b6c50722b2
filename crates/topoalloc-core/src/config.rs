//! Configuration types for topoalloc

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Topology source configuration
    pub topology: TopologyConfig,
    /// NUMA resolution configuration
    pub numa: NumaConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::TopoallocError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::TopoallocError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::TopoallocError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Where the device topology comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Path to the topology description file
    pub path: PathBuf,
    /// Allocation policy
    pub policy: PolicyKind,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/topoalloc/topology.toml"),
            policy: PolicyKind::BestEffort,
        }
    }
}

/// Allocation policy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Score-maximizing partition search
    BestEffort,
    /// Fixed DGX-1 groups for Pascal GPUs
    Dgx1Pascal,
    /// Fixed DGX-1 groups for Volta GPUs
    Dgx1Volta,
    /// Fixed DGX-2 groups for Volta GPUs
    Dgx2Volta,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::BestEffort => "best-effort",
            PolicyKind::Dgx1Pascal => "dgx1-pascal",
            PolicyKind::Dgx1Volta => "dgx1-volta",
            PolicyKind::Dgx2Volta => "dgx2-volta",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best-effort" => Ok(PolicyKind::BestEffort),
            "dgx1-pascal" => Ok(PolicyKind::Dgx1Pascal),
            "dgx1-volta" => Ok(PolicyKind::Dgx1Volta),
            "dgx2-volta" => Ok(PolicyKind::Dgx2Volta),
            other => Err(format!("unknown allocation policy: {}", other)),
        }
    }
}

/// NUMA resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumaConfig {
    /// Root of the sysfs mount
    pub sysfs_root: PathBuf,
    /// Container environment variable carrying the visible devices
    pub visible_devices_env: String,
}

impl Default for NumaConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
            visible_devices_env: "NVIDIA_VISIBLE_DEVICES".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (text or compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.numa.sysfs_root, PathBuf::from("/sys"));
        assert_eq!(config.numa.visible_devices_env, "NVIDIA_VISIBLE_DEVICES");
        assert_eq!(config.topology.policy, PolicyKind::BestEffort);
    }

    #[test]
    fn test_config_parse() {
        let toml_str = r#"
[topology]
path = "/tmp/topology.toml"
policy = "dgx1-volta"

[numa]
sysfs_root = "/host/sys"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.topology.policy, PolicyKind::Dgx1Volta);
        assert_eq!(config.numa.sysfs_root, PathBuf::from("/host/sys"));
        assert_eq!(config.numa.visible_devices_env, "NVIDIA_VISIBLE_DEVICES");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_policy_kind_names() {
        for kind in [
            PolicyKind::BestEffort,
            PolicyKind::Dgx1Pascal,
            PolicyKind::Dgx1Volta,
            PolicyKind::Dgx2Volta,
        ] {
            assert_eq!(kind.to_string().parse::<PolicyKind>(), Ok(kind));
        }
        assert!("dgx3".parse::<PolicyKind>().is_err());
    }
}
