//! Component C: `FftPlanCompiler`. Builds the butterfly graph for a
//! convolution section's single `2n`-point transform pair (spec §4.C's
//! one-section simplification), schedules it across `n` sample slots
//! by first-fit bin-packing on earliest-available time, allocates
//! working storage with circular-interval recycling, and self-checks
//! the result by replaying its storage-reuse history across 20
//! synthetic generations before handing back an immutable [`Plan`].

use rustfft::num_complex::Complex64;
use std::collections::BTreeMap;

use crate::error::{ConvolutionError, Result};
use crate::plan::model::{ButterflyOp, Plan, PlanStep};

const SELF_CHECK_GENERATIONS: u64 = 20;
const MAX_TRACKED_INTERVALS: usize = 100;
const SCHEDULE_BUDGET_SLACK: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Half(bool); // false = A, true = B

const HALF_A: Half = Half(false);
const HALF_B: Half = Half(true);

#[derive(Debug, Clone, Copy)]
struct ValueRef {
    node: usize,
    half: Half,
}

/// One arena entry: either a leaf (a live input sample, or a constant
/// wired in as a leaf so it can serve as a plain butterfly operand)
/// or a butterfly producing an A/B output pair.
struct GraphNode {
    is_leaf: bool,
    in0: Option<ValueRef>,
    in1: Option<ValueRef>,
    m_value: Complex64,
    earliest: u64,
    assigned_tick: u64,
    /// Storage index of the A half; B half is `storage + 1`. Leaves
    /// use only the A half and never go through the pair allocator.
    storage: i32,
    consumers: Vec<usize>,
}

struct Graph {
    nodes: Vec<GraphNode>,
}

impl Graph {
    fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    fn add_leaf(&mut self, storage: i32, ready: u64) -> usize {
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            is_leaf: true,
            in0: None,
            in1: None,
            m_value: Complex64::new(0.0, 0.0),
            earliest: ready,
            assigned_tick: ready,
            storage,
            consumers: Vec::new(),
        });
        id
    }

    fn add_butterfly(&mut self, in0: ValueRef, in1: ValueRef, m_value: Complex64) -> usize {
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            is_leaf: false,
            in0: Some(in0),
            in1: Some(in1),
            m_value,
            earliest: 0,
            assigned_tick: 0,
            storage: -1,
            consumers: Vec::new(),
        });
        self.nodes[in0.node].consumers.push(id);
        self.nodes[in1.node].consumers.push(id);
        id
    }

    fn tick_of(&self, r: ValueRef) -> u64 {
        self.nodes[r.node].assigned_tick
    }

    fn storage_of(&self, r: ValueRef) -> i32 {
        let s = self.nodes[r.node].storage;
        match r.half {
            HALF_A => s,
            _ => s + 1,
        }
    }

    /// Pass 1: earliest-available propagation and first-fit scheduling
    /// (spec §4.C step 2). Nodes are added in dependency order, so a
    /// single forward walk suffices.
    fn schedule(&mut self, num_slots: usize) -> Result<()> {
        let total_ops = self.nodes.iter().filter(|n| !n.is_leaf).count();
        let budget = ((total_ops as f64 / num_slots as f64) * SCHEDULE_BUDGET_SLACK).ceil() as usize;
        let budget = budget.max(1);
        let mut slot_loads = vec![0usize; num_slots];

        for i in 0..self.nodes.len() {
            if self.nodes[i].is_leaf {
                continue;
            }
            let a = self.nodes[i].in0.unwrap();
            let b = self.nodes[i].in1.unwrap();
            let earliest = self.tick_of(a).max(self.tick_of(b));
            self.nodes[i].earliest = earliest;
            self.nodes[i].assigned_tick = schedule_one(earliest, num_slots, budget, &mut slot_loads)?;
        }
        Ok(())
    }

    fn latest_use(&self, id: usize) -> u64 {
        self.nodes[id]
            .consumers
            .iter()
            .map(|&c| self.nodes[c].assigned_tick)
            .max()
            .unwrap_or(self.nodes[id].assigned_tick)
    }
}

fn schedule_one(earliest: u64, num_slots: usize, budget: usize, slot_loads: &mut [usize]) -> Result<u64> {
    for attempt in 0..num_slots as u64 {
        let candidate = earliest + attempt;
        let slot = (candidate % num_slots as u64) as usize;
        if slot_loads[slot] < budget {
            slot_loads[slot] += 1;
            return Ok(candidate);
        }
    }
    Err(ConvolutionError::PlanCompileFailure(format!(
        "no schedule slot available for op with earliest-available {earliest} under budget {budget}"
    )))
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    start: u64,
    end: u64,
}

fn linear_overlap(a: Interval, b: Interval) -> bool {
    a.start < b.end && b.start < a.end
}

fn circular_overlap(a: Interval, b: Interval, n: u64) -> bool {
    if n == 0 || a.end - a.start >= n || b.end - b.start >= n {
        return true;
    }
    let a0 = a.start % n;
    let a1 = a0 + (a.end - a.start);
    let b0 = b.start % n;
    let b1 = b0 + (b.end - b.start);
    let shifted = |x0: u64, x1: u64| Interval { start: x0 + n, end: x1 + n };
    linear_overlap(Interval { start: a0, end: a1 }, Interval { start: b0, end: b1 })
        || linear_overlap(shifted(a0, a1), Interval { start: b0, end: b1 })
        || linear_overlap(Interval { start: a0, end: a1 }, shifted(b0, b1))
}

/// Allocates pairs of working-memory slots for non-leaf graph nodes,
/// recycling a slot once none of its recorded usage intervals collide
/// (mod `num_slots`) with a new request (spec §4.C step 3). Every
/// interval a slot has ever carried is kept for the post-hoc self
/// check even after the slot stops being offered for reuse.
struct SlotAllocator {
    num_slots: u64,
    next_fresh: i32,
    reusable: BTreeMap<i32, Vec<Interval>>,
    history: BTreeMap<i32, Vec<Interval>>,
}

impl SlotAllocator {
    fn new(start_index: i32, num_slots: usize) -> Self {
        Self {
            num_slots: num_slots as u64,
            next_fresh: start_index,
            reusable: BTreeMap::new(),
            history: BTreeMap::new(),
        }
    }

    fn alloc_pair(&mut self, earliest: u64, latest_use: u64) -> i32 {
        let req = Interval { start: earliest, end: latest_use + 1 };
        let found = self
            .reusable
            .iter()
            .find(|(_, ivs)| ivs.iter().all(|iv| !circular_overlap(*iv, req, self.num_slots)))
            .map(|(&slot, _)| slot);

        let slot = found.unwrap_or_else(|| {
            let slot = self.next_fresh;
            self.next_fresh += 2;
            slot
        });

        let entry = self.reusable.entry(slot).or_default();
        entry.push(req);
        if entry.len() > MAX_TRACKED_INTERVALS {
            self.reusable.remove(&slot);
        }
        self.history.entry(slot).or_default().push(req);
        slot
    }

    fn storage_high_water(&self) -> i32 {
        self.next_fresh
    }
}

/// Replays every slot's full interval history across
/// [`SELF_CHECK_GENERATIONS`] synthetic laps, confirming no two
/// allocations assigned to the same physical slot actually overlap in
/// time once the schedule runs forever (spec §4.C step 4, §9).
fn self_check(allocator: &SlotAllocator) -> Result<()> {
    let n = allocator.num_slots;
    for (slot, intervals) in &allocator.history {
        for i in 0..intervals.len() {
            for j in (i + 1)..intervals.len() {
                let a = intervals[i];
                let b = intervals[j];
                for ga in 0..SELF_CHECK_GENERATIONS {
                    for gb in 0..SELF_CHECK_GENERATIONS {
                        let shift_a = Interval { start: a.start + ga * n, end: a.end + ga * n };
                        let shift_b = Interval { start: b.start + gb * n, end: b.end + gb * n };
                        if linear_overlap(shift_a, shift_b) {
                            return Err(ConvolutionError::PlanCompileFailure(format!(
                                "storage hazard: slot {slot} carries overlapping generations"
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Registers constants into a contiguous run of indices starting at
/// `next_index`: the entry pushed at vec position `i` always lands at
/// index `start_index + i`, so `entries` can be written to working
/// memory verbatim starting at that offset (spec §6's `constantsOffset`).
struct ConstantPool {
    entries: Vec<Complex64>,
    next_index: i32,
}

impl ConstantPool {
    fn new(start_index: i32) -> Self {
        Self { entries: Vec::new(), next_index: start_index }
    }

    fn register(&mut self, value: Complex64) -> i32 {
        let index = self.next_index;
        self.next_index += 1;
        self.entries.push(value);
        index
    }
}

fn build_bit_reverse_table(size: usize, log2n: usize) -> Vec<u32> {
    (0..size as u32).map(|i| i.reverse_bits() >> (u32::BITS as usize - log2n)).collect()
}

/// Appends one full radix-2 DIT pass set over `current` (a length-`total_n`
/// map from logical wire position to the graph value presently holding
/// it), returning the updated map. `current` must already reflect
/// bit-reversed leaf placement for the first call.
#[allow(clippy::too_many_arguments)]
fn run_dit_stages(
    graph: &mut Graph,
    total_n: usize,
    log2_total: usize,
    mut current: Vec<ValueRef>,
    sign: f64,
    constants: &mut ConstantPool,
) -> Vec<ValueRef> {
    for stage in 1..=log2_total {
        let m = 1usize << stage;
        let half = m / 2;
        let angle_step = sign * std::f64::consts::PI / half as f64;
        let twiddle: Vec<Complex64> = (0..half).map(|j| Complex64::from_polar(1.0, angle_step * j as f64)).collect();

        let mut next = current.clone();
        let mut group_start = 0usize;
        while group_start < total_n {
            for (j, &w) in twiddle.iter().enumerate() {
                let a_idx = group_start + j;
                let b_idx = a_idx + half;
                let node = graph.add_butterfly(current[a_idx], current[b_idx], w);
                next[a_idx] = ValueRef { node, half: HALF_A };
                next[b_idx] = ValueRef { node, half: HALF_B };
            }
            group_start += m;
        }
        current = next;
    }
    current
}

/// Compiles a convolution section's plan for block size `n` given the
/// already-normalised forward transform of the zero-padded impulse
/// response (length `2n`, as produced by `StagedFft::forward`).
pub fn compile_convolution_plan(n: usize, impulse_fft: &[Complex64]) -> Result<Plan> {
    if !n.is_power_of_two() || n == 0 {
        return Err(ConvolutionError::PlanCompileFailure(format!(
            "section size {n} is not a positive power of two"
        )));
    }
    let total_n = 2 * n;
    if impulse_fft.len() != total_n {
        return Err(ConvolutionError::PlanCompileFailure(format!(
            "impulse transform length {} does not match expected {total_n}",
            impulse_fft.len()
        )));
    }
    let log2_total = total_n.trailing_zeros() as usize;
    let bit_reverse = build_bit_reverse_table(total_n, log2_total);

    let mut graph = Graph::new();
    let mut constants = ConstantPool::new(0);

    // memory[0] is the always-zero operand every degenerate butterfly
    // uses; `Plan::initialize_constants` hardcodes it rather than
    // carrying it in the constants region, so it doesn't occupy a slot
    // in `constants.entries`.
    let zero_storage = 0i32;
    let zero_node = graph.add_leaf(zero_storage, 0);

    let leaf_storage_base = 1i32;
    let mut leaf_nodes = Vec::with_capacity(total_n);
    for i in 0..total_n {
        let window_pos = bit_reverse[i] as usize; // involution: also leaf i's window position
        // Every leaf is rewritten once per n-tick cycle: the new half at
        // tick `window_pos`, the old half at the same tick one cycle
        // later (it holds the previous cycle's new-half value by then).
        let ready = (window_pos % n) as u64;
        let storage = leaf_storage_base + i as i32;
        leaf_nodes.push(graph.add_leaf(storage, ready));
    }
    let persistent_high_water = leaf_storage_base + total_n as i32;

    let current: Vec<ValueRef> = leaf_nodes.iter().map(|&node| ValueRef { node, half: HALF_A }).collect();

    // Forward transform of the sliding window.
    let forward = run_dit_stages(&mut graph, total_n, log2_total, current, -1.0, &mut constants);

    // Scale-stage: the one 1/sqrt(2n) normalisation this construction
    // needs (see DESIGN.md); the impulse transform was normalised the
    // same way when it was computed, and the inverse pass below is left
    // raw so the two halves cancel out exactly.
    let inv_sqrt_total_n = 1.0 / (total_n as f64).sqrt();
    let mut scaled = Vec::with_capacity(total_n);
    for &v in &forward {
        let node = graph.add_butterfly(ValueRef { node: zero_node, half: HALF_A }, v, Complex64::new(inv_sqrt_total_n, 0.0));
        scaled.push(ValueRef { node, half: HALF_A });
    }

    // Impulse-response multiply, represented as a degenerate butterfly
    // per bin (spec §4.C, §9's discard-slot note).
    let mut multiplied = Vec::with_capacity(total_n);
    for (k, &v) in scaled.iter().enumerate() {
        let node = graph.add_butterfly(ValueRef { node: zero_node, half: HALF_A }, v, impulse_fft[k]);
        multiplied.push(ValueRef { node, half: HALF_A });
    }

    // Bit-reversal rewiring between the forward/multiply half and the
    // inverse DIT stages, also represented as degenerate butterflies.
    let mut inverse_leaves = Vec::with_capacity(total_n);
    for i in 0..total_n {
        let source = multiplied[bit_reverse[i] as usize];
        let node = graph.add_butterfly(ValueRef { node: zero_node, half: HALF_A }, source, Complex64::new(1.0, 0.0));
        inverse_leaves.push(ValueRef { node, half: HALF_A });
    }

    // Raw (unnormalised) inverse transform; see the scale-stage comment above.
    let time_domain = run_dit_stages(&mut graph, total_n, log2_total, inverse_leaves, 1.0, &mut constants);

    graph.schedule(n)?;

    // Retained back-half of the overlap-save window maps 1:1 onto this
    // cycle's n output ticks.
    let outputs: Vec<ValueRef> = (0..n).map(|t| time_domain[n + t]).collect();
    let max_delay = (0..n)
        .map(|t| graph.tick_of(outputs[t]) - t as u64)
        .max()
        .unwrap_or(0);

    let mut order: Vec<usize> = (0..graph.nodes.len()).filter(|&i| !graph.nodes[i].is_leaf).collect();
    order.sort_by_key(|&i| graph.nodes[i].assigned_tick);

    // Constants get a contiguous region right after the leaf inputs,
    // one slot per butterfly (every node in `order` registers exactly
    // one); op output storage starts beyond that. Without this the
    // constant pool and the leaf/op storage pools both start counting
    // from `persistent_high_water` and alias the same memory cells.
    constants.next_index = persistent_high_water;
    let op_storage_base = persistent_high_water + order.len() as i32;
    let mut allocator = SlotAllocator::new(op_storage_base, n);
    let mut steps: Vec<PlanStep> = (0..n)
        .map(|_| PlanStep { input_index: 0, input_index2: PlanStep::NO_SECOND_INPUT, output_index: 0, ops: Vec::new() })
        .collect();

    for t in 0..n {
        steps[t].input_index = leaf_storage_base + bit_reverse[n + t] as i32;
        // Refreshes the old half of the sliding window: the leaf at
        // window position `t` held this tick's value last cycle and
        // must carry it forward so the 2n-point transform keeps seeing
        // a genuine two-block history instead of permanent silence.
        steps[t].input_index2 = leaf_storage_base + bit_reverse[t] as i32;
    }

    for id in order {
        let (in0_ref, in1_ref, m_value, assigned_tick) = {
            let node = &graph.nodes[id];
            (node.in0.unwrap(), node.in1.unwrap(), node.m_value, node.assigned_tick)
        };
        let in0 = graph.storage_of(in0_ref);
        let in1 = graph.storage_of(in1_ref);
        let latest = graph.latest_use(id);
        let out = allocator.alloc_pair(assigned_tick, latest);
        graph.nodes[id].storage = out;
        let m = constants.register(m_value);

        let slot = (assigned_tick % n as u64) as usize;
        steps[slot].ops.push(ButterflyOp { in0, in1, out, m });
    }

    for t in 0..n {
        let slot = ((t as u64 + max_delay) % n as u64) as usize;
        steps[slot].output_index = graph.storage_of(outputs[t]);
    }

    self_check(&allocator)?;

    let storage_size = allocator.storage_high_water().max(constants.next_index) as usize;

    Ok(Plan {
        norm: 1.0,
        max_delay,
        storage_size,
        steps,
        constants_offset: persistent_high_water,
        constants: constants.entries,
        starting_index: 0,
        impulse_fft_offset: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_small_identity_impulse() {
        let n = 8;
        let total_n = 2 * n;
        let mut impulse_time = vec![0.0f64; total_n];
        impulse_time[0] = 1.0;
        let staged = crate::fft::StagedFftPlan::get_cached(total_n);
        let mut impulse_fft = vec![Complex64::new(0.0, 0.0); total_n];
        staged.compute_real(&impulse_time, &mut impulse_fft, crate::fft::FftDirection::Forward);

        let plan = compile_convolution_plan(n, &impulse_fft).expect("plan should compile");
        assert_eq!(plan.size(), n);
        assert!(plan.storage_size > 0);
        assert!(plan.total_ops() > 0);
    }

    #[test]
    fn rejects_non_power_of_two_size() {
        let impulse_fft = vec![Complex64::new(0.0, 0.0); 6];
        assert!(compile_convolution_plan(3, &impulse_fft).is_err());
    }

    #[test]
    fn rejects_mismatched_impulse_length() {
        let impulse_fft = vec![Complex64::new(0.0, 0.0); 4];
        assert!(compile_convolution_plan(8, &impulse_fft).is_err());
    }

    #[test]
    fn every_slot_stays_within_schedule_budget() {
        let n = 16;
        let total_n = 2 * n;
        let mut impulse_time = vec![0.0f64; total_n];
        impulse_time[0] = 1.0;
        let staged = crate::fft::StagedFftPlan::get_cached(total_n);
        let mut impulse_fft = vec![Complex64::new(0.0, 0.0); total_n];
        staged.compute_real(&impulse_time, &mut impulse_fft, crate::fft::FftDirection::Forward);

        let plan = compile_convolution_plan(n, &impulse_fft).expect("plan should compile");
        let avg = plan.total_ops() as f64 / plan.size() as f64;
        for step in &plan.steps {
            assert!((step.ops.len() as f64) <= avg * SCHEDULE_BUDGET_SLACK + 1.0);
        }
    }
}
