//! Container lifecycle hooks that pin memory to the right NUMA nodes

use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::cache::NumaTopologyCache;
use crate::discovery::{DeviceDiscoverer, SystemNodeSource};
use crate::{Container, NumaError, NumaResult};

/// Computes the memory node constraint for containers being created or
/// updated.
///
/// The topology is resolved once by [`NumaFilter::start`]; lifecycle calls
/// made before that fail with [`NumaError::NotInitialized`].
pub struct NumaFilter {
    cache: OnceLock<NumaTopologyCache>,
    discoverer: Arc<dyn DeviceDiscoverer>,
    system: Arc<dyn SystemNodeSource>,
}

impl NumaFilter {
    pub fn new(discoverer: Arc<dyn DeviceDiscoverer>, system: Arc<dyn SystemNodeSource>) -> Self {
        Self {
            cache: OnceLock::new(),
            discoverer,
            system,
        }
    }

    /// Resolve the system and device topology. Calling it again is a no-op.
    pub fn start(&self) -> NumaResult<()> {
        if self.cache.get().is_some() {
            debug!("NUMA filter already started");
            return Ok(());
        }

        let cache = NumaTopologyCache::initialize(self.system.as_ref(), self.discoverer.as_ref())?;
        if self.cache.set(cache).is_err() {
            debug!("NUMA topology initialized concurrently, keeping the first one");
        }
        info!("NUMA filter started");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.cache.get().is_some()
    }

    /// The topology cache, once started
    pub fn cache(&self) -> NumaResult<&NumaTopologyCache> {
        self.cache.get().ok_or(NumaError::NotInitialized)
    }

    /// NUMA nodes for a container, see
    /// [`NumaTopologyCache::resolve_container_nodes`]
    pub fn resolve_container_nodes(&self, container: &Container) -> NumaResult<Vec<String>> {
        self.cache()?
            .resolve_container_nodes(container, self.discoverer.as_ref())
    }

    /// Memory node constraint for a container being created
    pub fn create_container(&self, container: &Container) -> NumaResult<Option<String>> {
        self.adjust("create", container)
    }

    /// Memory node constraint for a container being updated
    pub fn update_container(&self, container: &Container) -> NumaResult<Option<String>> {
        self.adjust("update", container)
    }

    fn adjust(&self, event: &str, container: &Container) -> NumaResult<Option<String>> {
        let nodes = self.resolve_container_nodes(container).map_err(|e| {
            warn!(event, container = %container.id, error = %e, "Failed to resolve NUMA nodes");
            e
        })?;

        if nodes.is_empty() {
            debug!(event, container = %container.id, "No NUMA constraint to apply");
            return Ok(None);
        }

        let mems = nodes.join(",");
        info!(event, container = %container.id, mems = %mems, "Setting NUMA memory nodes");
        Ok(Some(mems))
    }
}
