//! Iterative in-place radix-2 decimation-in-time FFT with cache-aware
//! staging (spec §4.B). Normalisation is `1/sqrt(N)` in both
//! directions, so a forward transform followed by a backward transform
//! of the same plan reproduces the input exactly (to floating-point
//! tolerance) with no extra scaling at the call site.

use rustfft::num_complex::Complex64;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Number of butterflies between twiddle-factor resynchronisations
/// (recomputing `exp(i theta)` from scratch instead of repeatedly
/// multiplying a running increment) once a pass has grown past the L1
/// staging threshold. Bounds the accumulated phase error the spec
/// calls out for the `L1 < N <= L2` and `N > L2` staging strategies.
const TWIDDLE_RESYNC_PERIOD: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftDirection {
    Forward,
    Reverse,
}

impl FftDirection {
    const fn sign(self) -> f64 {
        match self {
            Self::Forward => -1.0,
            Self::Reverse => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageStrategy {
    /// `N <= L1`: one flat sequence of `log2(N)` passes over the whole
    /// array; the array itself already fits in cache so there's
    /// nothing to block.
    Flat,
    /// `L1 < N <= L2`: the first `local_stages` passes (block size
    /// `2^local_stages <= L1`) run to completion one L1-sized block at
    /// a time; the rest run globally.
    L1Staged { local_stages: usize },
    /// `N > L2`: same two-phase split, blocked at the coarser L2
    /// granularity instead.
    L2Staged { local_stages: usize },
}

/// How many of the earliest DIT passes only ever touch a contiguous
/// `2^k`-sized block (true for every `k` up to `log2n`, since stage
/// `s`'s butterflies never reach outside a `2^s`-sized group): the
/// largest such `k` whose block still fits the cache threshold.
fn block_stage_count(threshold: usize, log2n: usize) -> usize {
    if threshold < 2 {
        return 0;
    }
    let block_log2 = (usize::BITS - 1 - threshold.leading_zeros()) as usize;
    block_log2.min(log2n)
}

fn choose_strategy(n: usize, log2n: usize, l1: usize, l2: usize) -> StageStrategy {
    if n <= l1 {
        StageStrategy::Flat
    } else if n <= l2 {
        StageStrategy::L1Staged { local_stages: block_stage_count(l1, log2n) }
    } else {
        StageStrategy::L2Staged { local_stages: block_stage_count(l2, log2n) }
    }
}

/// An immutable, cache-shareable FFT plan for a fixed power-of-two
/// length. Bit-reversal table and stage count are precomputed once;
/// `compute` is reentrant and allocation-free on the hot path (the
/// caller supplies both buffers).
#[derive(Debug)]
pub struct StagedFftPlan {
    log2n: usize,
    size: usize,
    norm: f64,
    bit_reverse: Vec<u32>,
    strategy: StageStrategy,
    /// Wired but defaulted off: the spec notes a shuffle variant "is
    /// specified but disabled by default because in-situ measurements
    /// show no benefit". Kept as a field rather than deleted so a
    /// future tuning pass can flip it without re-deriving the option.
    pub shuffle_enabled: bool,
}

impl StagedFftPlan {
    fn new(size: usize, l1: usize, l2: usize) -> Self {
        assert!(size.is_power_of_two(), "StagedFft size must be a power of two");
        let log2n = size.trailing_zeros() as usize;
        Self {
            log2n,
            size,
            norm: 1.0 / (size as f64).sqrt(),
            bit_reverse: build_bit_reverse_table(size, log2n),
            strategy: choose_strategy(size, log2n, l1, l2),
            shuffle_enabled: false,
        }
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    /// Process-wide cache of plans keyed by `log2(N)`, construction
    /// serialised by a mutex (spec §4.B "FFT plan cache").
    pub fn get_cached(size: usize) -> Arc<Self> {
        static CACHE: OnceLock<Mutex<HashMap<usize, Arc<StagedFftPlan>>>> = OnceLock::new();
        let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
        let mut guard = cache.lock().expect("fft plan cache mutex poisoned");
        let cfg = crate::config::global();
        guard
            .entry(size)
            .or_insert_with(|| Arc::new(Self::new(size, cfg.l1_cache_elements, cfg.l2_cache_elements)))
            .clone()
    }

    /// Computes the length-`N` DFT of `input` into `output` (which may
    /// alias different storage than `input`; in-place use is also
    /// supported by passing the same slice as both, via
    /// [`Self::compute_in_place`]).
    pub fn compute(&self, input: &[Complex64], output: &mut [Complex64], dir: FftDirection) {
        assert_eq!(input.len(), self.size);
        assert_eq!(output.len(), self.size);
        for (i, &bit_reversed) in self.bit_reverse.iter().enumerate() {
            output[i] = input[bit_reversed as usize];
        }
        self.run_passes(output, dir);
    }

    /// Real-lifted forward/backward transform: zero-extends the
    /// imaginary component of each input sample.
    pub fn compute_real(&self, input: &[f64], output: &mut [Complex64], dir: FftDirection) {
        assert_eq!(input.len(), self.size);
        assert_eq!(output.len(), self.size);
        for (i, &bit_reversed) in self.bit_reverse.iter().enumerate() {
            output[i] = Complex64::new(input[bit_reversed as usize], 0.0);
        }
        self.run_passes(output, dir);
    }

    pub fn compute_in_place(&self, buffer: &mut [Complex64], dir: FftDirection) {
        assert_eq!(buffer.len(), self.size);
        apply_bit_reversal_in_place(buffer, &self.bit_reverse);
        self.run_passes(buffer, dir);
    }

    fn run_passes(&self, data: &mut [Complex64], dir: FftDirection) {
        if self.size <= 1 {
            return;
        }
        match self.strategy {
            StageStrategy::Flat => self.run_stage_range(data, dir, 1, self.log2n, false),
            StageStrategy::L1Staged { local_stages } | StageStrategy::L2Staged { local_stages } => {
                self.run_blocked(data, dir, local_stages)
            }
        }
        for sample in data.iter_mut() {
            *sample *= self.norm;
        }
    }

    /// Runs the first `local_stages` passes one cache-resident block
    /// at a time, then the remaining passes globally (spec §4.B's
    /// two-phase staged decomposition). Correct because a DIT stage
    /// `s`'s butterflies are confined to `2^s`-sized groups: for
    /// `s <= local_stages` every such group lies entirely inside one
    /// `2^local_stages`-sized block, so running those stages against
    /// the block's own 0-based indices reproduces exactly what running
    /// them against the full array would.
    fn run_blocked(&self, data: &mut [Complex64], dir: FftDirection, local_stages: usize) {
        if local_stages == 0 {
            self.run_stage_range(data, dir, 1, self.log2n, true);
            return;
        }
        let block_size = 1usize << local_stages;
        for block in data.chunks_mut(block_size) {
            self.run_stage_range(block, dir, 1, local_stages, false);
        }
        if local_stages < self.log2n {
            self.run_stage_range(data, dir, local_stages + 1, self.log2n, true);
        }
    }

    /// Runs DIT stages `first_stage..=last_stage` over `data` in
    /// place. `resync` periodically recomputes the twiddle factor from
    /// scratch instead of carrying a running increment, bounding
    /// accumulated phase error on the long-stride global passes.
    fn run_stage_range(&self, data: &mut [Complex64], dir: FftDirection, first_stage: usize, last_stage: usize, resync: bool) {
        for stage in first_stage..=last_stage {
            let m = 1usize << stage;
            let half = m / 2;
            let angle_step = dir.sign() * std::f64::consts::PI / half as f64;
            let w_inc = Complex64::from_polar(1.0, angle_step);

            let mut group_start = 0usize;
            let mut butterflies_since_resync = 0usize;
            while group_start < data.len() {
                let mut w = Complex64::new(1.0, 0.0);
                for j in 0..half {
                    if resync && butterflies_since_resync >= TWIDDLE_RESYNC_PERIOD {
                        w = Complex64::from_polar(1.0, angle_step * j as f64);
                        butterflies_since_resync = 0;
                    }
                    let a = group_start + j;
                    let b = a + half;
                    let t = data[b] * w;
                    let u = data[a];
                    data[a] = u + t;
                    data[b] = u - t;
                    w *= w_inc;
                    butterflies_since_resync += 1;
                }
                group_start += m;
            }
        }
    }
}

fn build_bit_reverse_table(size: usize, log2n: usize) -> Vec<u32> {
    (0..size as u32)
        .map(|i| i.reverse_bits() >> (u32::BITS as usize - log2n))
        .collect()
}

fn apply_bit_reversal_in_place(data: &mut [Complex64], table: &[u32]) {
    for i in 0..data.len() {
        let j = table[i] as usize;
        if i < j {
            data.swap(i, j);
        }
    }
}

/// Thin per-use wrapper around a cached [`StagedFftPlan`], mirroring
/// the reference implementation's public `StagedFft` facade.
pub struct StagedFft {
    plan: Arc<StagedFftPlan>,
}

impl StagedFft {
    pub fn new(size: usize) -> Self {
        Self {
            plan: StagedFftPlan::get_cached(size),
        }
    }

    pub const fn size(&self) -> usize {
        self.plan.size
    }

    pub fn forward(&self, input: &[Complex64], output: &mut [Complex64]) {
        if self.plan.size == 0 {
            return;
        }
        self.plan.compute(input, output, FftDirection::Forward);
    }

    pub fn backward(&self, input: &[Complex64], output: &mut [Complex64]) {
        if self.plan.size == 0 {
            return;
        }
        self.plan.compute(input, output, FftDirection::Reverse);
    }

    pub fn compute(&self, input: &[Complex64], output: &mut [Complex64], dir: FftDirection) {
        if self.plan.size == 0 {
            return;
        }
        self.plan.compute(input, output, dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(n: usize) {
        let plan = StagedFftPlan::new(n, 4096, 65536);
        let input: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new((i as f64 * 0.37).sin(), (i as f64 * 0.11).cos()))
            .collect();
        let mut freq = vec![Complex64::new(0.0, 0.0); n];
        plan.compute(&input, &mut freq, FftDirection::Forward);
        let mut back = vec![Complex64::new(0.0, 0.0); n];
        plan.compute(&freq, &mut back, FftDirection::Reverse);
        for (a, b) in input.iter().zip(back.iter()) {
            assert!((a - b).norm() < 1e-7, "{a} vs {b}");
        }
    }

    #[test]
    fn round_trip_small() {
        round_trip(4);
    }

    #[test]
    fn round_trip_large() {
        round_trip(32768);
    }

    #[test]
    fn single_tone_produces_expected_bin() {
        let n = 1024;
        let f = 17usize;
        let plan = StagedFftPlan::new(n, 4096, 65536);
        let input: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * f as f64 * i as f64 / n as f64).sin())
            .collect();
        let mut freq = vec![Complex64::new(0.0, 0.0); n];
        plan.compute_real(&input, &mut freq, FftDirection::Forward);

        let expected_mag = (n as f64).sqrt() / 2.0;
        for (bin, value) in freq.iter().enumerate() {
            if bin == f || bin == n - f {
                assert!(
                    (value.norm() - expected_mag).abs() < 1e-6,
                    "bin {bin}: {} vs {expected_mag}",
                    value.norm()
                );
            } else {
                assert!(value.norm() < 1e-6, "bin {bin} leaked energy: {}", value.norm());
            }
        }
    }

    /// Forces a plan through the blocked L1-staged path (`block_size`
    /// well under `n`, so the local phase genuinely spans multiple
    /// blocks) and checks it against rustfft, confirming the two-phase
    /// split reproduces a flat transform exactly rather than just
    /// varying twiddle-resync timing.
    #[test]
    fn blocked_strategy_matches_flat_reference() {
        let n = 4096;
        let flat = StagedFftPlan::new(n, 1 << 20, 1 << 20);
        let blocked = StagedFftPlan::new(n, 64, 1 << 20);
        assert!(matches!(blocked.strategy, StageStrategy::L1Staged { local_stages } if local_stages > 0 && local_stages < blocked.log2n));

        let input: Vec<Complex64> =
            (0..n).map(|i| Complex64::new((i as f64 * 0.013).sin(), (i as f64 * 0.029).cos())).collect();

        let mut expected = vec![Complex64::new(0.0, 0.0); n];
        flat.compute(&input, &mut expected, FftDirection::Forward);
        let mut got = vec![Complex64::new(0.0, 0.0); n];
        blocked.compute(&input, &mut got, FftDirection::Forward);

        for (e, g) in expected.iter().zip(got.iter()) {
            assert!((e - g).norm() < 1e-8, "{e} vs {g}");
        }
    }

    #[test]
    fn cached_instances_are_shared() {
        let a = StagedFftPlan::get_cached(256);
        let b = StagedFftPlan::get_cached(256);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
