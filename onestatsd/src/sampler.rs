use rand::{Rng as _, SeedableRng as _};
use rand_xoshiro::Xoshiro256StarStar;

/// Client-side sampler.
///
/// Decides, once per call, whether a metric should be emitted at all based on its sample rate.
pub(crate) struct Sampler {
    rng: Xoshiro256StarStar,
}

impl Sampler {
    /// Creates a new `Sampler` seeded from the thread-local RNG.
    pub fn from_entropy() -> Self {
        Sampler { rng: Xoshiro256StarStar::from_rng(&mut rand::rng()) }
    }

    /// Creates a new `Sampler` with a fixed seed, for reproducible sampling decisions.
    pub fn from_seed(seed: u64) -> Self {
        Sampler { rng: Xoshiro256StarStar::seed_from_u64(seed) }
    }

    /// Returns `true` if a metric with the given sample rate should be emitted.
    ///
    /// A sample rate of exactly 1 always passes without drawing a random value. Rates that are zero, negative, or NaN
    /// never pass. Otherwise, a value is drawn uniformly from `[0, 1)` and the metric passes if the value is less than
    /// or equal to the sample rate.
    #[allow(clippy::float_cmp)]
    pub fn should_sample(&mut self, sample_rate: f64) -> bool {
        if sample_rate == 1.0 {
            return true;
        }

        if sample_rate.is_nan() || sample_rate <= 0.0 {
            return false;
        }

        self.rng.random::<f64>() <= sample_rate
    }
}
