//! Seedable uniform random source

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform random numbers as consumed from the host
pub trait UniformSource {
    /// Restart the sequence from `seed`
    fn reset(&mut self, seed: u64);

    /// Uniform sample in `[0, 1)`
    fn uniform(&mut self) -> f64;

    /// Uniform sample in `[lo, hi)`
    fn uniform_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.uniform()
    }
}

/// [`UniformSource`] backed by rand's `StdRng`
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl UniformSource for SeededRandom {
    fn reset(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}
