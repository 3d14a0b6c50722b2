//! Best-effort allocation over the link topology
//!
//! Rather than greedily taking the single best-connected group of `size`
//! GPUs, the policy splits *all* available GPUs into groups of `size`, keeps
//! the split with the highest total link score, and returns the best group
//! from that split. Links are not hierarchical, so a greedy choice can strand
//! the remaining GPUs with poor connectivity for later requests.

use topoalloc_core::Device;
use tracing::debug;

use crate::policy::{is_unsatisfiable, Policy};

/// A slot in a padded device list; `None` is padding.
pub(crate) type Slot<'a> = Option<&'a Device>;

/// Score-maximizing allocation policy
#[derive(Debug, Clone, Copy, Default)]
pub struct BestEffortPolicy;

impl Policy for BestEffortPolicy {
    fn allocate<'a>(
        &self,
        available: &[&'a Device],
        required: &[&'a Device],
        size: usize,
    ) -> Vec<&'a Device> {
        if is_unsatisfiable(available.len(), required.len(), size) {
            return Vec::new();
        }

        // Best partition among those holding an unpadded group with every
        // required device. Ties keep the first partition found.
        let mut best: Option<(Vec<Vec<Slot<'a>>>, u32)> = None;
        for_each_partition(available, size, &mut |partition| {
            if !partition_has_set_with_all(partition, required) {
                return;
            }
            let score = partition_score(partition);
            if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
                best = Some((partition.to_vec(), score));
            }
        });

        let Some((partition, total_score)) = best else {
            debug!(size, available = available.len(), "No partition satisfies request");
            return Vec::new();
        };

        let mut best_set: Option<(&[Slot<'a>], u32)> = None;
        for set in partition
            .iter()
            .filter(|set| count_padding(set) == 0 && set_contains_all(set, required))
        {
            let score = set_score(set);
            if best_set.map_or(true, |(_, best_score)| score > best_score) {
                best_set = Some((set.as_slice(), score));
            }
        }

        match best_set {
            Some((set, score)) => {
                debug!(
                    size,
                    partition_score = total_score,
                    set_score = score,
                    gpus = ?set.iter().flatten().map(|d| d.index).collect::<Vec<_>>(),
                    "Selected GPU set"
                );
                set.iter().flatten().copied().collect()
            }
            None => Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "best-effort"
    }
}

/// Link score between two devices: the sum of the points of every link
/// between them. Padding and self-pairs score zero.
///
/// # Panics
///
/// Panics when the two devices disagree on how many links connect them.
pub fn pair_score(a: Option<&Device>, b: Option<&Device>) -> u32 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0;
    };
    if a.is(b) {
        return 0;
    }

    let forward = a.links_to(b.index);
    let backward = b.links_to(a.index);
    if forward.len() != backward.len() {
        panic!(
            "Internal error in best effort GPU allocator: links between GPU {} and GPU {} are not bidirectional ({} vs {})",
            a.index,
            b.index,
            forward.len(),
            backward.len()
        );
    }

    forward.iter().map(|link| link.points()).sum()
}

/// Sum of pair scores over every unordered pair in a set
pub(crate) fn set_score(set: &[Slot<'_>]) -> u32 {
    let mut score = 0;
    for_each_combination(set.len(), 2, &mut |pair| {
        score += pair_score(set[pair[0]], set[pair[1]]);
    });
    score
}

pub(crate) fn partition_score(partition: &[Vec<Slot<'_>>]) -> u32 {
    partition.iter().map(|set| set_score(set)).sum()
}

fn count_padding(set: &[Slot<'_>]) -> usize {
    set.iter().filter(|slot| slot.is_none()).count()
}

fn set_contains_all(set: &[Slot<'_>], devices: &[&Device]) -> bool {
    devices
        .iter()
        .all(|device| set.iter().flatten().any(|member| member.is(device)))
}

fn partition_has_set_with_all(partition: &[Vec<Slot<'_>>], devices: &[&Device]) -> bool {
    partition
        .iter()
        .any(|set| count_padding(set) == 0 && set_contains_all(set, devices))
}

/// Visit every combination of `size` positions out of `0..n`, in
/// lexicographic order. The positions handed to `callback` are ascending.
pub(crate) fn for_each_combination(n: usize, size: usize, callback: &mut dyn FnMut(&[usize])) {
    if size == 0 || size > n {
        return;
    }

    // Unrolled form of `size` nested loops, each starting one past the
    // index of the loop above it. `level` is the current loop depth.
    let mut indices = vec![0usize; size];
    let mut level = 0;
    loop {
        if indices[level] == n {
            if level == 0 {
                break;
            }
            level -= 1;
            indices[level] += 1;
            continue;
        }

        if level < size - 1 {
            level += 1;
            indices[level] = indices[level - 1] + 1;
            continue;
        }

        callback(&indices);
        indices[level] += 1;
    }
}

/// Visit every partition of `devices` into sets of `size`.
///
/// The device list is padded with `None` up to a multiple of `size`. Only
/// sets holding no padding or all of it are considered, and the first device
/// of the remaining pool is always placed in the next set, so no partition is
/// produced twice with its sets reordered.
pub(crate) fn for_each_partition<'a>(
    devices: &[&'a Device],
    size: usize,
    callback: &mut dyn FnMut(&[Vec<Slot<'a>>]),
) {
    if size == 0 || size > devices.len() {
        return;
    }

    if size == 1 {
        for device in devices {
            callback(&[vec![Some(*device)]]);
        }
        return;
    }

    let mut padded: Vec<Slot<'a>> = devices.iter().map(|d| Some(*d)).collect();
    while padded.len() % size != 0 {
        padded.push(None);
    }
    let padding = count_padding(&padded);

    partition_rec(&padded, size, padding, Vec::new(), callback);
}

fn partition_rec<'a>(
    devices: &[Slot<'a>],
    size: usize,
    padding: usize,
    accum: Vec<Vec<Slot<'a>>>,
    callback: &mut dyn FnMut(&[Vec<Slot<'a>>]),
) {
    // Padding keeps the pool a multiple of `size`.
    assert!(
        size <= devices.len(),
        "Internal error in best effort allocation policy"
    );

    if size == devices.len() {
        let mut partition = accum;
        partition.push(devices.to_vec());
        callback(&partition);
        return;
    }

    let first = devices[0];
    let rest = &devices[1..];
    for_each_combination(rest.len(), size - 1, &mut |chosen| {
        let mut set = Vec::with_capacity(size);
        set.push(first);
        set.extend(chosen.iter().map(|&i| rest[i]));

        let p = count_padding(&set);
        if p != 0 && p != padding {
            return;
        }

        let remaining: Vec<Slot<'a>> = rest
            .iter()
            .enumerate()
            .filter(|(i, _)| !chosen.contains(i))
            .map(|(_, slot)| *slot)
            .collect();

        // Each branch gets its own copy of the accumulated partition.
        let mut next = accum.clone();
        next.push(set);
        partition_rec(&remaining, size, padding, next, &mut *callback);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use topoalloc_core::{connect, LinkType};

    fn devices(count: usize) -> Vec<Device> {
        (0..count)
            .map(|i| Device::new(i, format!("GPU-{}", i)))
            .collect()
    }

    fn indices(set: &[&Device]) -> Vec<usize> {
        set.iter().map(|d| d.index).collect()
    }

    fn binomial(n: usize, k: usize) -> usize {
        (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
    }

    #[test]
    fn test_combination_count() {
        for n in 1..=8 {
            for k in 1..=n {
                let mut count = 0;
                for_each_combination(n, k, &mut |_| count += 1);
                assert_eq!(count, binomial(n, k), "C({}, {})", n, k);
            }
        }
    }

    #[test]
    fn test_combinations_are_ascending_and_unique() {
        let mut seen = Vec::new();
        for_each_combination(5, 3, &mut |c| {
            assert!(c.windows(2).all(|w| w[0] < w[1]));
            seen.push(c.to_vec());
        });
        let mut deduped = seen.clone();
        deduped.dedup();
        assert_eq!(seen.len(), deduped.len());
        assert_eq!(seen.first(), Some(&vec![0, 1, 2]));
        assert_eq!(seen.last(), Some(&vec![2, 3, 4]));
    }

    #[test]
    fn test_combination_out_of_range() {
        let mut count = 0;
        for_each_combination(3, 4, &mut |_| count += 1);
        for_each_combination(3, 0, &mut |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_partition_count_without_padding() {
        // 6 devices into pairs: 5 * 3 * 1 partitions
        let devs = devices(6);
        let refs: Vec<&Device> = devs.iter().collect();
        let mut count = 0;
        for_each_partition(&refs, 2, &mut |partition| {
            assert_eq!(partition.len(), 3);
            count += 1;
        });
        assert_eq!(count, 15);
    }

    #[test]
    fn test_partitions_cover_every_device_once() {
        let devs = devices(7);
        let refs: Vec<&Device> = devs.iter().collect();
        let mut count = 0;
        for_each_partition(&refs, 3, &mut |partition| {
            let mut members: Vec<usize> = partition
                .iter()
                .flatten()
                .flatten()
                .map(|d| d.index)
                .collect();
            members.sort_unstable();
            assert_eq!(members, (0..7).collect::<Vec<_>>());

            let padding: Vec<usize> = partition
                .iter()
                .map(|set| count_padding(set))
                .filter(|p| *p > 0)
                .collect();
            assert_eq!(padding, vec![2]);
            count += 1;
        });
        assert!(count > 0);
    }

    #[test]
    fn test_sibling_branches_do_not_share_accumulator() {
        let devs = devices(6);
        let refs: Vec<&Device> = devs.iter().collect();
        let mut partitions = Vec::new();
        for_each_partition(&refs, 2, &mut |partition| {
            partitions.push(
                partition
                    .iter()
                    .map(|set| set.iter().flatten().map(|d| d.index).collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
            );
        });

        assert_eq!(partitions[0], vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
        assert_eq!(partitions[1], vec![vec![0, 1], vec![2, 4], vec![3, 5]]);
        let mut unique = partitions.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), partitions.len());
    }

    #[test]
    fn test_pair_score() {
        let mut devs = devices(3);
        connect(&mut devs, 0, 1, LinkType::NvLink(2));
        connect(&mut devs, 0, 1, LinkType::SameBoard);
        connect(&mut devs, 1, 2, LinkType::CrossCpu);

        assert_eq!(pair_score(Some(&devs[0]), Some(&devs[1])), 260);
        assert_eq!(pair_score(Some(&devs[1]), Some(&devs[0])), 260);
        assert_eq!(pair_score(Some(&devs[1]), Some(&devs[2])), 10);
        assert_eq!(pair_score(Some(&devs[0]), Some(&devs[2])), 0);
        assert_eq!(pair_score(Some(&devs[0]), Some(&devs[0])), 0);
        assert_eq!(pair_score(Some(&devs[0]), None), 0);
        assert_eq!(pair_score(None, None), 0);
    }

    #[test]
    #[should_panic(expected = "not bidirectional")]
    fn test_pair_score_asymmetric_links_panics() {
        let mut devs = devices(2);
        devs[0].links.insert(1, vec![LinkType::NvLink(1)]);
        pair_score(Some(&devs[0]), Some(&devs[1]));
    }

    #[test]
    fn test_set_score_sums_pairs() {
        let mut devs = devices(3);
        connect(&mut devs, 0, 1, LinkType::NvLink(1));
        connect(&mut devs, 1, 2, LinkType::SingleSwitch);
        connect(&mut devs, 0, 2, LinkType::HostBridge);

        let set: Vec<Slot> = devs.iter().map(Some).chain([None]).collect();
        assert_eq!(set_score(&set), 180);
    }

    #[test]
    fn test_single_nvlink_pair_wins() {
        let mut devs = devices(4);
        connect(&mut devs, 0, 1, LinkType::NvLink(1));
        let refs: Vec<&Device> = devs.iter().collect();

        let result = BestEffortPolicy.allocate(&refs, &[], 2);
        assert_eq!(indices(&result), vec![0, 1]);
    }

    #[test]
    fn test_size_one_returns_singleton() {
        let devs = devices(4);
        let refs: Vec<&Device> = devs.iter().collect();

        let result = BestEffortPolicy.allocate(&refs, &[], 1);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_size_one_with_required() {
        let devs = devices(4);
        let refs: Vec<&Device> = devs.iter().collect();

        let result = BestEffortPolicy.allocate(&refs, &[refs[2]], 1);
        assert_eq!(indices(&result), vec![2]);
    }

    #[test]
    fn test_never_returns_padding() {
        // 5 devices, groups of 3: {0, 1, 2} + {3, 4, pad} is found first
        // among the best partitions. Its padded group holds the only link
        // and outscores the other, but cannot satisfy a request for 3.
        let mut devs = devices(5);
        connect(&mut devs, 3, 4, LinkType::NvLink(12));
        let refs: Vec<&Device> = devs.iter().collect();

        let result = BestEffortPolicy.allocate(&refs, &[], 3);
        assert_eq!(result.len(), 3);
        let chosen = indices(&result);
        assert!(chosen == vec![0, 1, 2] || chosen == vec![0, 3, 4], "{:?}", chosen);
    }

    #[test]
    fn test_tied_sets_skip_padding() {
        let devs = devices(4);
        let refs: Vec<&Device> = devs.iter().collect();

        let result = BestEffortPolicy.allocate(&refs, &[], 3);
        assert_eq!(result.len(), 3);
    }
}
