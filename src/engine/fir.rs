//! Plain time-domain FIR used for the impulse response's head (spec
//! §4.H): the first handful of taps need near-zero latency, which
//! rules out both convolution section flavours, so they are just
//! multiply-accumulated directly against a ring buffer of past input.

pub struct TimeDomainFir {
    taps: Vec<f64>,
    ring: Vec<f64>,
    pos: usize,
}

impl TimeDomainFir {
    pub fn new(taps: Vec<f64>) -> Self {
        let len = taps.len();
        Self { taps, ring: vec![0.0; len], pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn tick(&mut self, x: f64) -> f64 {
        let len = self.ring.len();
        if len == 0 {
            return 0.0;
        }
        self.pos = if self.pos == 0 { len - 1 } else { self.pos - 1 };
        self.ring[self.pos] = x;

        let mut acc = 0.0;
        for (i, &h) in self.taps.iter().enumerate() {
            acc += h * self.ring[(self.pos + i) % len];
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_tap_passes_through_unchanged() {
        let mut fir = TimeDomainFir::new(vec![1.0]);
        assert_eq!(fir.tick(0.5), 0.5);
        assert_eq!(fir.tick(-0.25), -0.25);
    }

    #[test]
    fn single_sample_delay() {
        let mut fir = TimeDomainFir::new(vec![0.0, 1.0]);
        assert_eq!(fir.tick(1.0), 0.0);
        assert_eq!(fir.tick(2.0), 1.0);
        assert_eq!(fir.tick(0.0), 2.0);
    }

    #[test]
    fn empty_taps_produce_silence() {
        let mut fir = TimeDomainFir::new(Vec::new());
        assert_eq!(fir.tick(1.0), 0.0);
    }
}
