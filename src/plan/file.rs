//! Binary plan file format (spec §6): little-endian, magic-framed,
//! optionally gzip-compressed by file extension. `in1` is delta-coded
//! against `in0` on disk (most butterflies have `in1 == in0 + 1`) and
//! expanded back to an absolute index on read.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{ConvolutionError, Result};
use crate::io::{BinaryReader, BinaryWriter};
use crate::plan::model::{ButterflyOp, Plan, PlanStep, FILE_VERSION, MAGIC_FILE_STRING, MAGIC_TAIL_CONSTANT};

fn is_gzip_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

pub fn write_plan(path: impl AsRef<Path>, plan: &Plan) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    if is_gzip_path(path) {
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        write_plan_to(encoder, plan)
    } else {
        write_plan_to(BufWriter::new(file), plan)
    }
}

pub fn read_plan(path: impl AsRef<Path>) -> Result<Plan> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if is_gzip_path(path) {
        read_plan_from(GzDecoder::new(BufReader::new(file)))
    } else {
        read_plan_from(BufReader::new(file))
    }
}

fn write_plan_to<W: Write>(inner: W, plan: &Plan) -> Result<()> {
    let mut w = BinaryWriter::new(inner);
    w.write_magic(MAGIC_FILE_STRING)?;
    w.write_u64(FILE_VERSION)?;
    w.write_f64(plan.norm)?;
    w.write_u64(plan.max_delay)?;
    w.write_u64(plan.storage_size as u64)?;

    w.write_u64(plan.steps.len() as u64)?;
    for step in &plan.steps {
        w.write_i32(step.input_index)?;
        w.write_i32(step.input_index2)?;
        w.write_i32(step.output_index)?;
        w.write_u64(step.ops.len() as u64)?;
        for op in &step.ops {
            w.write_i32(op.in0)?;
            w.write_i32(op.in1 - op.in0)?;
            w.write_i32(op.out)?;
            w.write_i32(op.m)?;
        }
    }

    w.write_i32(plan.constants_offset)?;
    w.write_u64(plan.constants.len() as u64)?;
    for &value in &plan.constants {
        w.write_complex64(value)?;
    }

    w.write_u64(plan.starting_index)?;
    w.write_u64(plan.impulse_fft_offset)?;

    w.write_u64(MAGIC_TAIL_CONSTANT)?;
    w.flush()
}

fn read_plan_from<R: Read>(inner: R) -> Result<Plan> {
    let mut r = BinaryReader::new(inner);
    if !r.read_magic(MAGIC_FILE_STRING)? {
        return Err(ConvolutionError::InvalidPlanFile("bad magic string".into()));
    }
    let version = r.read_u64()?;
    if version != FILE_VERSION {
        return Err(ConvolutionError::InvalidPlanFile(format!(
            "unsupported plan file version {version}, expected {FILE_VERSION}"
        )));
    }
    let norm = r.read_f64()?;
    let max_delay = r.read_u64()?;
    let storage_size = r.read_u64()? as usize;

    let step_count = r.read_u64()? as usize;
    let mut steps = Vec::with_capacity(step_count);
    for _ in 0..step_count {
        let input_index = r.read_i32()?;
        let input_index2 = r.read_i32()?;
        let output_index = r.read_i32()?;
        let op_count = r.read_u64()? as usize;
        let mut ops = Vec::with_capacity(op_count);
        for _ in 0..op_count {
            let in0 = r.read_i32()?;
            let in1_delta = r.read_i32()?;
            let out = r.read_i32()?;
            let m = r.read_i32()?;
            ops.push(ButterflyOp { in0, in1: in0 + in1_delta, out, m });
        }
        steps.push(PlanStep { input_index, input_index2, output_index, ops });
    }

    let constants_offset = r.read_i32()?;
    let constant_count = r.read_u64()? as usize;
    let mut constants = Vec::with_capacity(constant_count);
    for _ in 0..constant_count {
        constants.push(r.read_complex64()?);
    }

    let starting_index = r.read_u64()?;
    let impulse_fft_offset = r.read_u64()?;

    let tail = r.read_u64()?;
    if tail != MAGIC_TAIL_CONSTANT {
        return Err(ConvolutionError::InvalidPlanFile("missing tail magic".into()));
    }

    Ok(Plan {
        norm,
        max_delay,
        storage_size,
        steps,
        constants_offset,
        constants,
        starting_index,
        impulse_fft_offset,
    })
}
