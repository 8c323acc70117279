use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal, UnitSphere};
use serde::{Deserialize, Serialize};

/// Deterministic per-stream seed: splitmix-style mix of a master seed and a stream id.
fn stream_seed(master: u64, stream_id: usize) -> u64 {
    let mut x = master ^ ((stream_id as u64).wrapping_mul(0x9E3779B97F4A7C15));
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

/// The random number capability used by all moves.
///
/// One ChaCha20 stream drives every proposal; its state serializes with the
/// rest of a snapshot, so a resumed run continues the same stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RngWrapper {
    seed: u64,
    rng: ChaCha20Rng,
}

impl RngWrapper {
    pub fn new(seed: u64) -> Self {
        Self { seed, rng: ChaCha20Rng::seed_from_u64(stream_seed(seed, 0)) }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform in [0, 1).
    #[inline(always)]
    pub fn rand01(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform in [lo, hi).
    #[inline(always)]
    pub fn rand_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.rng.gen::<f64>()
    }

    /// Uniform integer in [lo, hi], both inclusive.
    pub fn rand_int(&mut self, lo: usize, hi: usize) -> usize {
        self.rng.gen_range(lo..=hi)
    }

    pub fn gaussian(&mut self, stddev: f64, mean: f64) -> f64 {
        match Normal::new(mean, stddev) {
            Ok(normal) => normal.sample(&mut self.rng),
            // zero or non-finite width degenerates to the mean
            Err(_) => mean,
        }
    }

    pub fn rand_point_on_sphere(&mut self) -> [f64; 3] {
        UnitSphere.sample(&mut self.rng)
    }
}
