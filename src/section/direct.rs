//! Component E: `DirectConvolutionSection`. Classic overlap-save
//! block-rate convolution for the large, infrequently-scheduled tail
//! partitions, computed with `realfft`'s real-to-complex transform pair
//! instead of the balanced per-sample schedule (spec §4.E). Dispatch to
//! a worker thread and the scheduling deadline live in
//! [`crate::engine::partition`]; this type is the pure compute kernel.

use realfft::num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::error::{ConvolutionError, Result};

pub struct DirectConvolutionSection {
    size: usize,
    fft_len: usize,
    sample_offset: usize,
    r2c: Arc<dyn RealToComplex<f64>>,
    c2r: Arc<dyn ComplexToReal<f64>>,
    impulse_fft: Vec<Complex64>,
    history: Vec<f64>,
    work_time: Vec<f64>,
    work_freq: Vec<Complex64>,
    out_time: Vec<f64>,
    fwd_scratch: Vec<Complex64>,
    inv_scratch: Vec<Complex64>,
}

impl DirectConvolutionSection {
    /// `sample_offset` is this section's position within the overall
    /// impulse response, used by the partitioner to order sections by
    /// scheduling deadline rather than to affect the convolution math.
    pub fn new(impulse_segment: &[f64], sample_offset: usize) -> Result<Self> {
        let size = impulse_segment.len();
        if size == 0 || !size.is_power_of_two() {
            return Err(ConvolutionError::PlanCompileFailure(format!(
                "direct section size {size} is not a positive power of two"
            )));
        }
        let fft_len = 2 * size;

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_len);
        let c2r = planner.plan_fft_inverse(fft_len);

        let mut padded = r2c.make_input_vec();
        padded[..size].copy_from_slice(impulse_segment);
        let mut impulse_fft = r2c.make_output_vec();
        let mut scratch = r2c.make_scratch_vec();
        r2c
            .process_with_scratch(&mut padded, &mut impulse_fft, &mut scratch)
            .map_err(|e| ConvolutionError::PlanCompileFailure(e.to_string()))?;

        let work_freq = r2c.make_output_vec();
        let fwd_scratch = r2c.make_scratch_vec();
        let inv_scratch = c2r.make_scratch_vec();

        Ok(Self {
            size,
            fft_len,
            sample_offset,
            r2c,
            c2r,
            impulse_fft,
            history: vec![0.0; fft_len],
            work_time: vec![0.0; fft_len],
            work_freq,
            out_time: vec![0.0; fft_len],
            fwd_scratch,
            inv_scratch,
        })
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    pub const fn sample_offset(&self) -> usize {
        self.sample_offset
    }

    /// A full block of new input must accumulate before this section
    /// can produce output; this is the latency that drives its
    /// scheduling deadline (spec §4.H).
    pub const fn delay(&self) -> usize {
        self.size
    }

    /// Slides `size` new input samples into the section's sliding
    /// window and returns the `size` linearly-convolved output samples
    /// for that window, via real-to-complex overlap-save.
    pub fn execute(&mut self, input_block: &[f64]) -> Result<Vec<f64>> {
        if input_block.len() != self.size {
            return Err(ConvolutionError::PlanCompileFailure(format!(
                "direct section expected a block of {}, got {}",
                self.size,
                input_block.len()
            )));
        }

        self.history.copy_within(self.size.., 0);
        self.history[self.size..].copy_from_slice(input_block);
        self.work_time.copy_from_slice(&self.history);

        self.r2c
            .process_with_scratch(&mut self.work_time, &mut self.work_freq, &mut self.fwd_scratch)
            .map_err(|e| ConvolutionError::PlanCompileFailure(e.to_string()))?;

        for (bin, imp) in self.work_freq.iter_mut().zip(self.impulse_fft.iter()) {
            *bin *= imp;
        }

        self.c2r
            .process_with_scratch(&mut self.work_freq, &mut self.out_time, &mut self.inv_scratch)
            .map_err(|e| ConvolutionError::PlanCompileFailure(e.to_string()))?;

        let norm = 1.0 / self.fft_len as f64;
        Ok(self.out_time[self.size..].iter().map(|v| v * norm).collect())
    }
}
