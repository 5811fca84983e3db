use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use rustortion_core::ConvolutionEngine;

fn build_engine(ir_length: usize) -> ConvolutionEngine {
    let mut impulse = vec![0.0f64; ir_length];
    impulse[0] = 1.0;
    for (i, sample) in impulse.iter_mut().enumerate().skip(1) {
        *sample = 0.5 / (i as f64);
    }
    ConvolutionEngine::new(&impulse).expect("engine should build for a benchmark impulse")
}

fn bench_tick_by_impulse_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("ConvolutionEngine::tick");

    for &ir_length in &[256usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(ir_length), &ir_length, |b, &ir_length| {
            let mut engine = build_engine(ir_length);
            b.iter(|| black_box(engine.tick(black_box(0.25))));
        });
    }

    group.finish();
}

fn bench_process_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ConvolutionEngine::process");

    for &buffer_size in &[64usize, 128, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(buffer_size), &buffer_size, |b, &buffer_size| {
            let mut engine = build_engine(4096);
            let input = vec![0.3f64; buffer_size];
            let mut output = vec![0.0f64; buffer_size];
            b.iter(|| {
                engine.process(black_box(&input), black_box(&mut output));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tick_by_impulse_length, bench_process_buffer);
criterion_main!(benches);
