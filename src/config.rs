//! Process-wide configuration carrier.
//!
//! The reference implementation keeps the plan-cache directory, the
//! in-memory plan cache, the lead-time table, and the sample rate the
//! lead-time table was benchmarked at as global mutable statics (spec
//! §9, "Global mutable state"). This module collects all of it into one
//! value, `EngineConfig`, held behind an [`ArcSwap`] so the audio thread
//! can read it without ever blocking on a mutex.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// Sample rate the built-in lead-time table was benchmarked at.
pub const REFERENCE_SAMPLE_RATE: f64 = 44_100.0;

/// L1-equivalent cache block size, in complex elements, used by
/// [`crate::fft::staged`] to choose a staging strategy.
pub const DEFAULT_L1_ELEMENTS: usize = 4096;

/// L2-equivalent cache block size, in complex elements.
pub const DEFAULT_L2_ELEMENTS: usize = 65536;

/// One row of the per-size execution-cost table that
/// [`crate::engine::partition`] uses to compute direct-section lead
/// times. `worker_thread` is the 1-based worker class a direct section
/// of this size is dispatched to; `None` means the size is never worth
/// running as a direct section (balanced is always at least as good).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeadTimeEntry {
    pub size: usize,
    pub nanoseconds_per_sample: f64,
    pub worker_thread: Option<usize>,
}

/// Process-wide tuning configuration.
///
/// Defaults are chosen for a small-core 64-bit ARM class machine, per
/// spec §9's "Cache-size tuning constants ... treat as configuration"
/// guidance; a host may override any field, persisted the same way the
/// donor application persists user settings (plain `serde_json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory plan files are read from and written to. `None`
    /// disables the on-disk cache entirely (plans are always compiled).
    pub plan_directory: Option<PathBuf>,
    pub l1_cache_elements: usize,
    pub l2_cache_elements: usize,
    pub reference_sample_rate: f64,
    pub lead_time_table: Vec<LeadTimeEntry>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plan_directory: None,
            l1_cache_elements: DEFAULT_L1_ELEMENTS,
            l2_cache_elements: DEFAULT_L2_ELEMENTS,
            reference_sample_rate: REFERENCE_SAMPLE_RATE,
            lead_time_table: default_lead_time_table(),
        }
    }
}

/// Built-in per-size execution cost table, modeled on the reference
/// implementation's `executionTimePerSampleNs` table: cost per sample
/// roughly tracks `size` (larger blocks amortise FFT overhead better
/// per-sample but take longer per invocation), and worker-thread
/// assignment escalates with size so small, tight-deadline sections
/// never queue behind large ones.
fn default_lead_time_table() -> Vec<LeadTimeEntry> {
    let sizes_and_threads: &[(usize, f64, Option<usize>)] = &[
        (128, 58.0, Some(1)),
        (256, 42.0, Some(1)),
        (512, 31.0, Some(1)),
        (1024, 23.0, Some(2)),
        (2048, 18.0, Some(2)),
        (4096, 14.0, Some(3)),
        (8192, 11.0, Some(3)),
        (16384, 9.0, Some(4)),
        (32768, 7.5, Some(4)),
        (65536, 6.5, Some(5)),
        (131072, 6.0, Some(5)),
    ];
    sizes_and_threads
        .iter()
        .map(|&(size, ns, thread)| LeadTimeEntry {
            size,
            nanoseconds_per_sample: ns,
            worker_thread: thread,
        })
        .collect()
}

impl EngineConfig {
    pub fn lead_time_entry(&self, size: usize) -> Option<&LeadTimeEntry> {
        self.lead_time_table.iter().find(|e| e.size == size)
    }
}

fn global_cell() -> &'static ArcSwap<EngineConfig> {
    static CONFIG: OnceLock<ArcSwap<EngineConfig>> = OnceLock::new();
    CONFIG.get_or_init(|| ArcSwap::from_pointee(EngineConfig::default()))
}

/// Returns the current process-wide configuration.
pub fn global() -> Arc<EngineConfig> {
    global_cell().load_full()
}

/// Replaces the process-wide configuration wholesale.
pub fn set_global(config: EngineConfig) {
    global_cell().store(Arc::new(config));
}

/// Equivalent of the reference implementation's
/// `SetPlanFileDirectory(path)`: updates only the plan-cache directory,
/// leaving the rest of the configuration untouched.
pub fn set_plan_directory(path: impl Into<PathBuf>) {
    let path = path.into();
    global_cell().rcu(|current| {
        let mut next = (**current).clone();
        next.plan_directory = Some(path.clone());
        next
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_sorted_by_size() {
        let cfg = EngineConfig::default();
        let mut sizes: Vec<usize> = cfg.lead_time_table.iter().map(|e| e.size).collect();
        let mut sorted = sizes.clone();
        sorted.sort_unstable();
        assert_eq!(sizes, sorted);
        sizes.dedup();
        assert_eq!(sizes.len(), cfg.lead_time_table.len());
    }

    #[test]
    fn set_plan_directory_only_touches_that_field() {
        let before = global();
        set_plan_directory("/tmp/rustortion-plans");
        let after = global();
        assert_eq!(after.plan_directory.as_deref(), Some(std::path::Path::new("/tmp/rustortion-plans")));
        assert_eq!(after.l1_cache_elements, before.l1_cache_elements);
    }
}
