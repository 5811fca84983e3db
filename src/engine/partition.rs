//! Impulse-response partitioning policy (spec §4.H): a short
//! time-domain head, then a size-doubling sweep of partitions each
//! assigned to a balanced or a direct section depending on whether the
//! configured lead-time table marks that size worth a worker thread.

use crate::config::EngineConfig;

const MIN_HEAD_SIZE: usize = 128;
const FIRST_PARTITION_SIZE: usize = 128;
const MAX_PARTITION_SIZE: usize = 131_072;

/// Above this size a balanced (per-sample scheduled) section can no
/// longer keep up with the audio thread's budget, so the partitioner
/// hands it to a direct section on a worker thread instead, regardless
/// of what the lead-time table says.
const BALANCED_SIZE_CEILING: usize = 4096;

pub struct PartitionPlan {
    pub head_size: usize,
    /// `(offset, size)` pairs, in impulse-response order.
    pub balanced: Vec<(usize, usize)>,
    pub direct: Vec<(usize, usize)>,
}

pub fn plan(impulse_len: usize, cfg: &EngineConfig) -> PartitionPlan {
    if impulse_len == 0 {
        return PartitionPlan { head_size: 0, balanced: Vec::new(), direct: Vec::new() };
    }

    let head_size = MIN_HEAD_SIZE.min(impulse_len);
    let mut balanced = Vec::new();
    let mut direct = Vec::new();

    let mut offset = head_size;
    let mut size = FIRST_PARTITION_SIZE;
    while offset < impulse_len {
        let wants_worker_thread = cfg.lead_time_entry(size).is_some_and(|entry| entry.worker_thread.is_some());
        if size <= BALANCED_SIZE_CEILING || !wants_worker_thread {
            balanced.push((offset, size));
        } else {
            direct.push((offset, size));
        }
        offset += size;
        size = (size * 2).min(MAX_PARTITION_SIZE);
    }

    PartitionPlan { head_size, balanced, direct }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_impulse_is_all_head() {
        let cfg = EngineConfig::default();
        let plan = plan(64, &cfg);
        assert_eq!(plan.head_size, 64);
        assert!(plan.balanced.is_empty());
        assert!(plan.direct.is_empty());
    }

    #[test]
    fn long_impulse_produces_both_section_kinds() {
        let cfg = EngineConfig::default();
        let plan = plan(1_000_000, &cfg);
        assert!(!plan.balanced.is_empty());
        assert!(!plan.direct.is_empty());
        let mut covered = plan.head_size;
        for &(offset, size) in plan.balanced.iter().chain(plan.direct.iter()) {
            assert_eq!(offset, covered);
            covered += size;
        }
    }
}
