//! Fixed allocation groups for DGX systems

use topoalloc_core::{Device, DeviceSet};

use crate::policy::{is_unsatisfiable, Policy};

/// Valid groups of device indices, by allocation size
type ValidSets = &'static [(usize, &'static [&'static [usize]])];

const DGX1_SINGLES: &[&[usize]] = &[&[0], &[1], &[2], &[3], &[4], &[5], &[6], &[7]];
const DGX1_QUADS: &[&[usize]] = &[&[0, 1, 2, 3], &[4, 5, 6, 7]];
const DGX1_ALL: &[&[usize]] = &[&[0, 1, 2, 3, 4, 5, 6, 7]];

const DGX1_PASCAL: ValidSets = &[
    (1, DGX1_SINGLES),
    (2, &[&[0, 2], &[1, 3], &[4, 6], &[5, 7]]),
    (4, DGX1_QUADS),
    (8, DGX1_ALL),
];

const DGX1_VOLTA: ValidSets = &[
    (1, DGX1_SINGLES),
    (2, &[&[0, 3], &[1, 2], &[4, 7], &[5, 6]]),
    (4, DGX1_QUADS),
    (8, DGX1_ALL),
];

const DGX2_VOLTA: ValidSets = &[
    (
        1,
        &[
            &[0], &[1], &[2], &[3], &[4], &[5], &[6], &[7],
            &[8], &[9], &[10], &[11], &[12], &[13], &[14], &[15],
        ],
    ),
    (
        2,
        &[&[0, 1], &[2, 3], &[4, 5], &[6, 7], &[8, 9], &[10, 11], &[12, 13], &[14, 15]],
    ),
    (
        4,
        &[&[0, 1, 2, 3], &[4, 5, 6, 7], &[8, 9, 10, 11], &[12, 13, 14, 15]],
    ),
    (8, &[&[0, 1, 2, 3, 4, 5, 6, 7], &[8, 9, 10, 11, 12, 13, 14, 15]]),
    (16, &[&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]]),
];

/// Allocation restricted to hard-coded device groups of a known system.
///
/// Sizes without a group list never allocate.
#[derive(Debug, Clone, Copy)]
pub struct StaticDgxPolicy {
    name: &'static str,
    valid_sets: ValidSets,
}

impl StaticDgxPolicy {
    /// DGX-1 with Pascal GPUs
    pub fn dgx1_pascal() -> Self {
        Self {
            name: "static-dgx1-pascal",
            valid_sets: DGX1_PASCAL,
        }
    }

    /// DGX-1 with Volta GPUs
    pub fn dgx1_volta() -> Self {
        Self {
            name: "static-dgx1-volta",
            valid_sets: DGX1_VOLTA,
        }
    }

    /// DGX-2 with Volta GPUs
    pub fn dgx2_volta() -> Self {
        Self {
            name: "static-dgx2-volta",
            valid_sets: DGX2_VOLTA,
        }
    }

    fn sets_for(&self, size: usize) -> &'static [&'static [usize]] {
        self.valid_sets
            .iter()
            .find(|(n, _)| *n == size)
            .map(|(_, sets)| *sets)
            .unwrap_or(&[])
    }
}

impl Policy for StaticDgxPolicy {
    fn allocate<'a>(
        &self,
        available: &[&'a Device],
        required: &[&'a Device],
        size: usize,
    ) -> Vec<&'a Device> {
        if is_unsatisfiable(available.len(), required.len(), size) {
            return Vec::new();
        }
        find_gpu_set(available, required, size, self.sets_for(size))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// First group from `valid_sets` that holds every required device and whose
/// other members are all available. Required devices come first in the
/// result, then the rest of the group in index order.
fn find_gpu_set<'a>(
    available: &[&'a Device],
    required: &[&'a Device],
    size: usize,
    valid_sets: &[&[usize]],
) -> Vec<&'a Device> {
    let mut available_set = DeviceSet::from_devices(available);
    if !available_set.contains_all(required) {
        return Vec::new();
    }
    available_set.remove(required);
    let candidates = available_set.sorted();

    for valid_set in valid_sets {
        if !required.iter().all(|d| valid_set.contains(&d.index)) {
            continue;
        }

        let mut allocated: Vec<&'a Device> = valid_set
            .iter()
            .filter_map(|i| required.iter().find(|d| d.index == *i).copied())
            .collect();
        allocated.extend(
            valid_set
                .iter()
                .filter_map(|i| candidates.iter().find(|d| d.index == *i).copied()),
        );

        if allocated.len() == size {
            return allocated;
        }
    }

    Vec::new()
}
