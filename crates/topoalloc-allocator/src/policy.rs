//! Allocation policies

use topoalloc_core::{Device, PolicyKind};

use crate::besteffort::BestEffortPolicy;
use crate::static_dgx::StaticDgxPolicy;

/// Strategy for choosing a group of GPUs
pub trait Policy: Send + Sync {
    /// Pick `size` devices from `available`, including every device in
    /// `required`. Returns an empty vector when no such group exists.
    fn allocate<'a>(
        &self,
        available: &[&'a Device],
        required: &[&'a Device],
        size: usize,
    ) -> Vec<&'a Device>;

    /// Get the policy name
    fn name(&self) -> &'static str;
}

/// Build the policy selected in configuration
pub fn policy_for(kind: PolicyKind) -> Box<dyn Policy> {
    match kind {
        PolicyKind::BestEffort => Box::new(BestEffortPolicy),
        PolicyKind::Dgx1Pascal => Box::new(StaticDgxPolicy::dgx1_pascal()),
        PolicyKind::Dgx1Volta => Box::new(StaticDgxPolicy::dgx1_volta()),
        PolicyKind::Dgx2Volta => Box::new(StaticDgxPolicy::dgx2_volta()),
    }
}

/// Shared precondition check: a request that can never be satisfied
pub(crate) fn is_unsatisfiable(available: usize, required: usize, size: usize) -> bool {
    size == 0 || available < size || required > size
}
