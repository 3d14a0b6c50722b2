//! topoalloc CLI
//!
//! Command-line interface for topology-aware GPU allocation and NUMA
//! placement.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use topoalloc_core::{Config, PolicyKind};
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// topoalloc - GPU topology-aware allocation and NUMA placement
#[derive(Parser, Debug)]
#[command(name = "topoalloc")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Topology file (overrides the configuration)
    #[arg(long, global = true)]
    topology: Option<PathBuf>,

    /// Allocation policy (best-effort, dgx1-pascal, dgx1-volta, dgx2-volta)
    #[arg(long, global = true)]
    policy: Option<PolicyKind>,

    /// Log level (overrides the configuration)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pick the preferred GPUs for a request
    Allocate {
        /// Number of GPUs to pick
        #[arg(long)]
        size: usize,

        /// UUIDs that may be picked (defaults to every GPU)
        #[arg(long, value_delimiter = ',')]
        available: Vec<String>,

        /// UUIDs that must be picked
        #[arg(long, value_delimiter = ',')]
        required: Vec<String>,
    },

    /// Replay a sequence of reservations against the topology
    Plan {
        /// GPU counts to reserve, in order
        #[arg(value_delimiter = ',', required = true)]
        counts: Vec<usize>,
    },

    /// Resolve the memory NUMA nodes for a container
    NumaNodes {
        /// Container ID used in log output
        #[arg(long, default_value = "cli")]
        container: String,

        /// Current memory node constraint (e.g. 0-1)
        #[arg(long)]
        mems: Option<String>,

        /// Visible devices (all, none, indices or UUIDs)
        #[arg(long)]
        visible_devices: Option<String>,

        /// Root of the sysfs mount (overrides the configuration)
        #[arg(long)]
        sysfs_root: Option<PathBuf>,
    },

    /// Show the GPUs and links of the topology
    Topology,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(path) = &cli.topology {
        config.topology.path = path.clone();
    }
    if let Some(policy) = cli.policy {
        config.topology.policy = policy;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    init_logging(&config, cli.verbose)?;
    debug!(?config, "Loaded configuration");

    match cli.command {
        Commands::Allocate {
            size,
            available,
            required,
        } => {
            commands::allocate(&config, size, available, required, cli.json)?;
        }
        Commands::Plan { counts } => {
            commands::plan(&config, &counts, cli.json)?;
        }
        Commands::NumaNodes {
            container,
            mems,
            visible_devices,
            sysfs_root,
        } => {
            if let Some(root) = sysfs_root {
                config.numa.sysfs_root = root;
            }
            commands::numa_nodes(&config, container, mems, visible_devices, cli.json)?;
        }
        Commands::Topology => {
            commands::topology(&config, cli.json)?;
        }
    }

    Ok(())
}

fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let log_level = if verbose {
        Level::DEBUG
    } else {
        parse_level(&config.logging.level)
    };

    // RUST_LOG takes precedence when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.format == "compact" {
        tracing::subscriber::set_global_default(builder.compact().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("loud"), Level::INFO);
    }
}
