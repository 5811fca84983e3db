//! Typed error kinds the core raises (spec §7).
//!
//! Only failures that are actually propagated to a caller get a
//! `ConvolutionError` variant. `WriteUnderrun` and `ReaderUnderrun` are
//! non-fatal and are tracked as plain counters instead (see
//! [`crate::delay_line::single_reader`] and [`crate::engine`]).

use thiserror::Error;

/// Errors the convolution core can raise.
#[derive(Debug, Error)]
pub enum ConvolutionError {
    /// The FFT plan compiler could not fit all butterflies under the
    /// per-slot budget within `size` scheduling attempts.
    #[error("plan compilation failed: {0}")]
    PlanCompileFailure(String),

    /// A plan file failed magic/version/tail validation, or was
    /// truncated mid-read.
    #[error("invalid plan file: {0}")]
    InvalidPlanFile(String),

    /// An underlying I/O failure while reading or writing a plan file.
    #[error("plan I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The delay line or output queue was closed while a call was
    /// blocked on it. Expected during shutdown; workers translate this
    /// into a normal thread exit rather than propagating it further.
    #[error("delay line closed")]
    Closed,

    /// A reader asked for a sample range the writer has already
    /// overwritten. Indicates a scheduling/deadline bug upstream.
    #[error("read underrun: requested range has already been overwritten")]
    ReadUnderrun,
}

pub type Result<T> = std::result::Result<T, ConvolutionError>;
