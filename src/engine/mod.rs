//! Component H: `ConvolutionEngine`, the top-level facade that
//! partitions an impulse response into a time-domain head, a bank of
//! balanced sections run inline, and a bank of direct sections each
//! dispatched to its own worker thread (spec §4.H, §5).

pub mod fir;
pub mod partition;

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::delay_line::{spawn_worker, SingleReaderDelayLine, SynchronizedDelayLine};
use crate::error::Result;
use crate::section::{BalancedConvolutionSection, DirectConvolutionSection};
use fir::TimeDomainFir;

struct DirectWorker {
    output: Arc<SingleReaderDelayLine>,
    handle: Option<JoinHandle<()>>,
    /// Extra output-side hold, `offset - section.delay()` samples, so
    /// this section's block-pipelined contribution lands on the same
    /// absolute tick a `BalancedConvolutionSection` extracted from the
    /// same `offset` would (spec §4.H). Seeded with zeros so it drains
    /// one sample per tick from the moment it's created.
    output_delay: VecDeque<f64>,
}

struct BalancedWorker {
    section: BalancedConvolutionSection,
    /// `offset - section.delay()`: how far behind the live input this
    /// section's tap must run so its output lands in phase with every
    /// other partition's (spec §4.H).
    sample_delay: u64,
}

/// Owns every section an impulse response was partitioned into and
/// drives them one sample (or one buffer) at a time. Dropping the
/// engine closes the shared input line and joins every worker thread,
/// so no thread outlives the engine that spawned it.
pub struct ConvolutionEngine {
    head: TimeDomainFir,
    balanced: Vec<BalancedWorker>,
    shared_input: Arc<SynchronizedDelayLine>,
    write_pos: u64,
    direct_workers: Vec<DirectWorker>,
}

impl ConvolutionEngine {
    pub fn new(impulse_response: &[f64]) -> Result<Self> {
        let cfg = crate::config::global();
        let plan = partition::plan(impulse_response.len(), &cfg);

        let head = TimeDomainFir::new(impulse_response[..plan.head_size].to_vec());

        let mut balanced = Vec::with_capacity(plan.balanced.len());
        for &(offset, size) in &plan.balanced {
            let section = BalancedConvolutionSection::new(&extract_padded(impulse_response, offset, size))?;
            let sample_delay = (offset as u64).saturating_sub(section.delay());
            balanced.push(BalancedWorker { section, sample_delay });
        }

        let shared_input = Arc::new(SynchronizedDelayLine::new(shared_capacity(&balanced, &plan.direct)));

        let mut direct_workers = Vec::with_capacity(plan.direct.len());
        for (worker_index, &(offset, size)) in plan.direct.iter().enumerate() {
            let segment = extract_padded(impulse_response, offset, size);
            let mut section = DirectConvolutionSection::new(&segment, offset)?;
            let output = Arc::new(SingleReaderDelayLine::new((size * 4).next_power_of_two()));
            let input_line = shared_input.clone();
            let output_for_worker = output.clone();
            let priority_offset = worker_priority_offset(&cfg, size);

            let handle = spawn_worker(format!("convolution-direct-{worker_index}"), priority_offset, move || {
                let mut cursor = 0u64;
                let mut block = vec![0.0f64; size];
                loop {
                    input_line.wait_for_more_read_data(cursor + size as u64 - 1)?;
                    input_line.read_range(cursor, &mut block)?;
                    let result = section.execute(&block)?;
                    for sample in result {
                        output_for_worker.push(sample);
                    }
                    cursor += size as u64;
                }
            });

            let extra_delay = offset.saturating_sub(size);
            direct_workers.push(DirectWorker {
                output,
                handle: Some(handle),
                output_delay: VecDeque::from(vec![0.0; extra_delay]),
            });
        }

        log::info!(
            "ConvolutionEngine created: head={}, balanced={} section(s), direct={} section(s)",
            head.len(),
            plan.balanced.len(),
            plan.direct.len()
        );

        Ok(Self { head, balanced, shared_input, write_pos: 0, direct_workers })
    }

    /// Processes one input sample, returning the fully mixed output of
    /// the head FIR, every balanced section, and whatever direct
    /// section results have arrived so far.
    ///
    /// Every balanced and direct partition was extracted from the
    /// impulse response at a nonzero `offset` and re-indexed to start
    /// at 0 (see [`extract_padded`]), so each reads a correspondingly
    /// delayed tap of the live input — `delay_line[offset -
    /// section.delay()]` for balanced sections, an equal-length
    /// output-side hold for direct ones — rather than the raw current
    /// sample (spec §2, §4.H).
    pub fn tick(&mut self, x: f64) -> f64 {
        let mut out = self.head.tick(x);

        let pos = self.write_pos;
        self.shared_input.write(x);
        self.shared_input.synch_write();
        self.write_pos += 1;

        for worker in &mut self.balanced {
            let delayed = if pos >= worker.sample_delay {
                self.shared_input
                    .at(pos - worker.sample_delay)
                    .expect("shared delay line sized to cover every balanced section's sample delay")
            } else {
                0.0
            };
            out += worker.section.tick(delayed);
        }

        for worker in &mut self.direct_workers {
            worker.output_delay.push_back(worker.output.pop().unwrap_or(0.0));
            out += worker.output_delay.pop_front().expect("output_delay never empties below its seeded length");
        }
        out
    }

    pub fn process(&mut self, input: &[f64], output: &mut [f64]) {
        assert_eq!(input.len(), output.len(), "input/output buffers must be the same length");
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.tick(*x);
        }
    }

    /// Total reader-side underruns across every direct section, i.e.
    /// how many ticks had no fresh tail-partition contribution ready
    /// yet (non-fatal, spec §7).
    pub fn reader_underrun_count(&self) -> usize {
        self.direct_workers.iter().map(|w| w.output.underrun_count()).sum()
    }
}

impl Drop for ConvolutionEngine {
    fn drop(&mut self) {
        self.shared_input.close();
        for worker in &mut self.direct_workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn extract_padded(impulse: &[f64], offset: usize, size: usize) -> Vec<f64> {
    let mut segment = vec![0.0; size];
    if offset < impulse.len() {
        let available = (impulse.len() - offset).min(size);
        segment[..available].copy_from_slice(&impulse[offset..offset + available]);
    }
    segment
}

/// Sized to cover the furthest lookback any reader needs: a balanced
/// section's `sample_delay`, or the handful of in-flight blocks a
/// direct worker's async dispatch can fall behind by.
fn shared_capacity(balanced: &[BalancedWorker], direct: &[(usize, usize)]) -> usize {
    let max_balanced_delay = balanced.iter().map(|w| w.sample_delay).max().unwrap_or(0);
    let max_direct_size = direct.iter().map(|&(_, size)| size).max().unwrap_or(1);
    (max_balanced_delay.max((max_direct_size * 8) as u64) + 2).next_power_of_two() as usize
}

fn worker_priority_offset(cfg: &crate::config::EngineConfig, size: usize) -> i32 {
    cfg.lead_time_entry(size).and_then(|e| e.worker_thread).map_or(1, |thread| thread as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_impulse_produces_silence() {
        let impulse = vec![0.0f64; 256];
        let mut engine = ConvolutionEngine::new(&impulse).unwrap();
        for _ in 0..512 {
            assert_eq!(engine.tick(1.0), 0.0);
        }
    }

    #[test]
    fn identity_impulse_recovers_input_with_head_only() {
        let mut impulse = vec![0.0f64; 64];
        impulse[0] = 1.0;
        let mut engine = ConvolutionEngine::new(&impulse).unwrap();
        assert_eq!(engine.tick(0.75), 0.75);
        assert_eq!(engine.tick(-0.25), -0.25);
    }

    #[test]
    fn process_matches_tick_sample_by_sample() {
        let impulse = vec![1.0f64, 0.5, 0.25, 0.0];
        let mut a = ConvolutionEngine::new(&impulse).unwrap();
        let mut b = ConvolutionEngine::new(&impulse).unwrap();

        let input = [0.1, 0.2, -0.3, 0.0, 0.4];
        let mut buffered = vec![0.0; input.len()];
        b.process(&input, &mut buffered);

        for (i, &x) in input.iter().enumerate() {
            assert_eq!(a.tick(x), buffered[i]);
        }
    }
}
