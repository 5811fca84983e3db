#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap
)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
#![allow(
    clippy::module_name_repetitions,
    clippy::items_after_statements,
    clippy::option_if_let_else,
    clippy::doc_markdown,
    clippy::float_cmp,
    clippy::match_same_arms,
    clippy::struct_field_names,
    clippy::needless_pass_by_value,
    clippy::unnecessary_wraps,
    clippy::if_not_else,
    clippy::match_wildcard_for_single_variants,
    clippy::single_match_else,
    clippy::unnested_or_patterns,
    clippy::trivially_copy_pass_by_ref
)]
#![allow(clippy::redundant_pub_crate, clippy::significant_drop_tightening)]

//! Partitioned convolution engine for realtime cabinet simulation and
//! convolution reverb. See `SPEC_FULL.md` in the repository root for the
//! full component design; this crate implements components A through H
//! plus the ambient configuration/error/logging stack around them.

pub mod config;
pub mod delay_line;
pub mod engine;
pub mod error;
pub mod fft;
pub mod io;
pub mod plan;
pub mod priority;
pub mod section;

pub use config::EngineConfig;
pub use engine::ConvolutionEngine;
pub use error::ConvolutionError;
