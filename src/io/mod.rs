//! Component A: little-endian primitive and composite I/O for persisted
//! FFT plans (spec §4.A).

pub mod binary;

pub use binary::{BinaryReader, BinaryWriter};
