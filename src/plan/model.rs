//! Plan data model (spec §3, §6): the compiled, immutable butterfly
//! schedule a `BalancedConvolutionSection` (or a plain balanced FFT)
//! steps through once per sample, plus the binary file framing
//! constants both [`super::compiler`] and [`super::file`] share.

use rustfft::num_complex::Complex64;

pub const MAGIC_FILE_STRING: &[u8; 8] = b"FftPlan\0";
pub const FILE_VERSION: u64 = 101;
pub const MAGIC_TAIL_CONSTANT: u64 = 0x1039_4A2B_E7F3_C34D;

/// One radix-2 butterfly: `t := m*in1; out := in0+t; out+1 := in0-t`.
///
/// The degenerate case `in0 == zero constant` turns this into a plain
/// scaled copy (`out = m*in1`, `out+1` unused) — how the compiler
/// represents the impulse-response multiply and the bit-reversal
/// rewiring between the forward and inverse halves of a section,
/// uniformly with every other op in the schedule (spec §4.C, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButterflyOp {
    pub in0: i32,
    pub in1: i32,
    pub out: i32,
    pub m: i32,
}

impl ButterflyOp {
    #[inline]
    pub fn tick(&self, memory: &mut [Complex64]) {
        let t = memory[self.m as usize] * memory[self.in1 as usize];
        let u = memory[self.in0 as usize];
        memory[self.out as usize] = u + t;
        memory[(self.out + 1) as usize] = u - t;
    }
}

/// The ops run during one sample tick, plus where that tick's input
/// sample(s) get written before they run.
#[derive(Debug, Clone, Default)]
pub struct PlanStep {
    /// New-half leaf: written with this tick's incoming sample.
    pub input_index: i32,
    /// Old-half leaf: refreshed with the value `input_index` held one
    /// n-tick cycle ago, keeping the `2n`-point window a genuine
    /// overlap-save transform instead of a zero-padded block (spec
    /// §4.C, §4.D). `-1` (`NO_SECOND_INPUT`) for plans with no second
    /// input slot to refresh.
    pub input_index2: i32,
    pub output_index: i32,
    pub ops: Vec<ButterflyOp>,
}

impl PlanStep {
    pub const NO_SECOND_INPUT: i32 = -1;
}

/// An immutable, precompiled schedule. `steps.len()` sample ticks make
/// up one repeating cycle; `storage_size` complex slots of working
/// memory are shared by every instance compiled from this plan.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Scale applied to the incoming sample before it enters the
    /// graph. `1/sqrt(steps.len())` for a plain balanced FFT (spec
    /// §4.B); `1.0` for a convolution section, whose own internal
    /// scale-stage (spec §4.C) already normalises the transform pair.
    pub norm: f64,
    pub max_delay: u64,
    pub storage_size: usize,
    pub steps: Vec<PlanStep>,
    /// Start of the contiguous twiddle/impulse-multiplier constants
    /// region in working memory (spec §6's `constantsOffset`); `memory[0]`,
    /// the always-zero operand every degenerate butterfly uses (spec
    /// §9), is pre-seeded separately and isn't part of this region.
    pub constants_offset: i32,
    pub constants: Vec<Complex64>,
    /// The slot index a freshly constructed section starts ticking
    /// from (spec §6's `startingIndex`). Always `0` for every plan this
    /// compiler produces.
    pub starting_index: u64,
    /// Spec §6's `impulseFftOffset`: where a section's precomputed
    /// impulse transform lives in working memory. This construction
    /// folds the impulse multiply into each bin's degenerate-butterfly
    /// constant instead (see `constants` above) rather than keeping a
    /// separate impulse-transform array, so there's no such region;
    /// always `0`. Carried only so the on-disk layout matches spec §6
    /// byte-for-byte (see DESIGN.md).
    pub impulse_fft_offset: u64,
}

impl Plan {
    pub fn size(&self) -> usize {
        self.steps.len()
    }

    /// Algorithmic latency in samples: `plan.maxDelay - plan.size/2`
    /// (spec §4.D), unaffected by whether the plan backs a convolution
    /// section or the superseded even/odd construction.
    pub fn delay(&self) -> u64 {
        self.max_delay.saturating_sub((self.steps.len() / 2) as u64)
    }

    /// Seeds working memory with both the always-zero operand at index
    /// 0 (spec §9) and the contiguous twiddle/impulse-multiplier
    /// constants at `constants_offset`.
    pub fn initialize_constants(&self, memory: &mut [Complex64]) {
        memory[0] = Complex64::new(0.0, 0.0);
        let base = self.constants_offset as usize;
        memory[base..base + self.constants.len()].copy_from_slice(&self.constants);
    }

    /// Writes `value` (pre-scaled by `norm`) into the step's new-half
    /// input slot and `old_value` into its old-half slot (if the plan
    /// has one), runs that step's ops, and returns the value now
    /// sitting in its output slot.
    pub fn tick(&self, step: usize, value: Complex64, old_value: Complex64, memory: &mut [Complex64]) -> Complex64 {
        let s = &self.steps[step];
        memory[s.input_index as usize] = value * self.norm;
        if s.input_index2 >= 0 {
            memory[s.input_index2 as usize] = old_value * self.norm;
        }
        for op in &s.ops {
            op.tick(memory);
        }
        memory[s.output_index as usize]
    }

    pub fn total_ops(&self) -> usize {
        self.steps.iter().map(|s| s.ops.len()).sum()
    }
}
