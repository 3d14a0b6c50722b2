//! CLI commands implementation

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;
use topoalloc_allocator::{pair_score, policy_for, GpuAllocator};
use topoalloc_core::{Config, DeviceList, TopologyFile};
use topoalloc_numa::{nodelist, Container, NumaFilter, StaticDiscoverer, SysfsNodeSource};
use tracing::info;

/// Load the device list of the configured topology file
pub fn load_devices(config: &Config) -> Result<DeviceList> {
    let topology = TopologyFile::from_file(&config.topology.path)?;
    let devices = topology.device_list()?;
    info!(
        path = %config.topology.path.display(),
        gpus = devices.len(),
        "Loaded topology"
    );
    Ok(devices)
}

fn allocator(config: &Config) -> Result<GpuAllocator> {
    Ok(GpuAllocator::new(
        load_devices(config)?,
        policy_for(config.topology.policy),
    ))
}

/// Allocation result
#[derive(Debug, Serialize)]
struct AllocationOutput {
    policy: String,
    size: usize,
    devices: Vec<String>,
}

/// Pick the preferred GPUs for a request
pub fn allocate(
    config: &Config,
    size: usize,
    available: Vec<String>,
    required: Vec<String>,
    json: bool,
) -> Result<()> {
    let allocator = allocator(config)?;
    let available = if available.is_empty() {
        allocator.device_status().iter().map(|s| s.device.uuid.clone()).collect()
    } else {
        available
    };

    let devices = allocator.preferred_allocation(&available, &required, size)?;
    if devices.is_empty() {
        bail!(
            "no allocation of {} GPUs satisfies the request ({} available, {} required)",
            size,
            available.len(),
            required.len()
        );
    }

    if json {
        let output = AllocationOutput {
            policy: config.topology.policy.to_string(),
            size,
            devices,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for uuid in devices {
        println!("{}", uuid);
    }
    Ok(())
}

/// One step of a reservation plan
#[derive(Debug, Serialize)]
struct PlanStep {
    count: usize,
    gpus: Vec<usize>,
    error: Option<String>,
}

/// Replay a sequence of reservations against the topology
pub fn plan(config: &Config, counts: &[usize], json: bool) -> Result<()> {
    let mut allocator = allocator(config)?;

    let steps: Vec<PlanStep> = counts
        .iter()
        .map(|&count| match allocator.allocate(count) {
            Ok(gpus) => PlanStep {
                count,
                gpus,
                error: None,
            },
            Err(e) => PlanStep {
                count,
                gpus: Vec::new(),
                error: Some(e.to_string()),
            },
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    println!("{:<6} {:<8} {}", "STEP", "COUNT", "GPUS");
    println!("{}", "-".repeat(40));
    for (i, step) in steps.iter().enumerate() {
        let result = match &step.error {
            Some(error) => format!("failed: {}", error),
            None => step
                .gpus
                .iter()
                .map(|g| g.to_string())
                .collect::<Vec<_>>()
                .join(","),
        };
        println!("{:<6} {:<8} {}", i + 1, step.count, result);
    }

    println!();
    println!(
        "GPUs: {} total, {} available",
        allocator.total_count(),
        allocator.available_count()
    );
    for status in allocator.device_status() {
        println!(
            "[{}] {} - {}",
            status.device.index,
            status.device.uuid,
            if status.allocated { "In Use" } else { "Available" }
        );
    }
    Ok(())
}

/// NUMA resolution result
#[derive(Debug, Serialize)]
struct NumaOutput {
    container: String,
    nodes: Vec<String>,
    mems: String,
}

/// Resolve the memory NUMA nodes for a container
pub fn numa_nodes(
    config: &Config,
    container_id: String,
    mems: Option<String>,
    visible_devices: Option<String>,
    json: bool,
) -> Result<()> {
    let discoverer = StaticDiscoverer::from_file(
        &config.topology.path,
        &config.numa.sysfs_root,
        &config.numa.visible_devices_env,
    )?;
    let filter = NumaFilter::new(
        Arc::new(discoverer),
        Arc::new(SysfsNodeSource::new(&config.numa.sysfs_root)),
    );
    filter.start()?;

    let mut container = Container::new(container_id);
    if let Some(mems) = &mems {
        container = container.with_mems(mems);
    }
    if let Some(devices) = &visible_devices {
        container = container.with_env(&config.numa.visible_devices_env, devices);
    }

    let nodes = filter.resolve_container_nodes(&container)?;
    let parsed = nodelist::parse(&nodes.join(","))?;
    let output = NumaOutput {
        container: container.id,
        mems: nodelist::format(&parsed),
        nodes,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Nodes: {}", output.nodes.join(","));
        println!("Mems: {}", output.mems);
    }
    Ok(())
}

/// Show the GPUs and links of the topology
pub fn topology(config: &Config, json: bool) -> Result<()> {
    let devices = load_devices(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices.0)?);
        return Ok(());
    }

    for device in &devices {
        println!("{}", device.details());
    }

    if devices.len() > 1 {
        println!();
        println!("Pair scores:");
        for a in devices.iter() {
            let row: Vec<String> = devices
                .iter()
                .map(|b| {
                    if a.is(b) {
                        "-".to_string()
                    } else {
                        pair_score(Some(a), Some(b)).to_string()
                    }
                })
                .collect();
            println!("  GPU {:<3} {}", a.index, row.join("\t"));
        }
    }
    Ok(())
}
