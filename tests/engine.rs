use rustortion_core::{ConvolutionEngine, EngineConfig};

#[test]
fn engine_processes_non_zero_signal() {
    let mut impulse = vec![0.0f64; 512];
    impulse[0] = 1.0;
    for (i, sample) in impulse.iter_mut().enumerate().skip(1) {
        *sample = 0.3 / (i as f64);
    }

    let mut engine = ConvolutionEngine::new(&impulse).expect("engine should build");

    let input = vec![0.5f64; 128];
    let mut output = vec![0.0f64; 128];
    for _ in 0..10 {
        engine.process(&input, &mut output);
    }

    assert!(output.iter().any(|&x| x != 0.0), "expected non-zero output");
}

#[test]
fn engine_is_linear_over_scaled_input() {
    let mut impulse = vec![0.0f64; 256];
    impulse[0] = 1.0;
    impulse[3] = 0.5;

    let mut unit = ConvolutionEngine::new(&impulse).unwrap();
    let mut scaled = ConvolutionEngine::new(&impulse).unwrap();

    let input = [0.2, -0.1, 0.4, 0.0, -0.3, 0.1];
    let unit_out: Vec<f64> = input.iter().map(|&x| unit.tick(x)).collect();
    let scaled_out: Vec<f64> = input.iter().map(|&x| scaled.tick(2.0 * x)).collect();

    for (u, s) in unit_out.iter().zip(scaled_out.iter()) {
        assert!((2.0 * u - s).abs() < 1e-6, "expected linearity: {u} vs {s}");
    }
}

#[test]
fn engine_recovers_delta_impulse_through_a_balanced_section() {
    let mut impulse = vec![0.0f64; 2048];
    impulse[0] = 1.0;

    let mut engine = ConvolutionEngine::new(&impulse).unwrap();

    let input = [0.9, -0.4, 0.1, 0.0, 0.6];
    let mut outputs = Vec::new();
    for &x in &input {
        outputs.push(engine.tick(x));
    }
    for _ in 0..input.len() {
        outputs.push(engine.tick(0.0));
    }

    for (i, &x) in input.iter().enumerate() {
        assert!((outputs[i] - x).abs() < 1e-6, "sample {i}: expected {x}, got {}", outputs[i]);
    }
}

#[test]
fn engine_matches_brute_force_convolution_across_head_and_balanced_partitions() {
    // Energy in the head (taps 0, 3) and in the first balanced
    // partition (taps 130, 190, 255, all >= head_size=128), run long
    // enough to span several of the balanced section's n-tick cycles.
    // Only correct with both a refreshed overlap-save window (no
    // partition is a near-delta impulse here) and a correctly delayed
    // tap into that partition (its taps sit at a nonzero offset) does
    // the engine's raw tick-for-tick output match a brute-force
    // reference with no extra alignment fudge.
    let mut impulse = vec![0.0f64; 256];
    impulse[0] = 1.0;
    impulse[3] = 0.4;
    impulse[130] = 0.5;
    impulse[190] = -0.3;
    impulse[255] = 0.15;

    let mut engine = ConvolutionEngine::new(&impulse).unwrap();

    let input: Vec<f64> = (0..400)
        .map(|i| (i as f64 * 0.23).sin() * 0.7 - (i as f64 * 0.071).cos() * 0.3)
        .collect();

    let outputs: Vec<f64> = input.iter().map(|&x| engine.tick(x)).collect();

    for t in 0..input.len() {
        let mut expected = 0.0;
        for (j, &h) in impulse.iter().enumerate() {
            if j <= t {
                expected += h * input[t - j];
            }
        }
        assert!(
            (outputs[t] - expected).abs() < 1e-6,
            "sample {t}: expected {expected}, got {}",
            outputs[t]
        );
    }
}

#[test]
fn engine_with_large_impulse_uses_direct_sections_without_deadlock() {
    let cfg = EngineConfig::default();
    let mut impulse = vec![0.0f64; 40_000];
    impulse[0] = 1.0;
    for i in 1..impulse.len() {
        impulse[i] = 0.1 / (i as f64).sqrt();
    }

    let mut engine = ConvolutionEngine::new(&impulse).expect("large impulse should partition cleanly");

    let input = vec![0.25f64; 4096];
    let mut output = vec![0.0f64; 4096];

    for _ in 0..4 {
        engine.process(&input, &mut output);
    }

    assert!(output.iter().all(|x| x.is_finite()));
    // A direct section needs several buffers to warm up before its
    // worker publishes anything; some underrun is expected early on,
    // but the reader must still report a finite count rather than
    // hang or panic.
    let _ = engine.reader_underrun_count();
    let _ = cfg;
}
