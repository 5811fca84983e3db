//! Component B: `StagedFft`, an iterative in-place radix-2 FFT with
//! cache-aware staging (spec §4.B).

pub mod staged;

pub use staged::{FftDirection, StagedFft, StagedFftPlan};
