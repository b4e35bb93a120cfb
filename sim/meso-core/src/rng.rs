//! Deterministic randomness for pairwise kernels.
//!
//! Dissipative particle dynamics needs a random variate per *interacting
//! pair*, identical no matter which side of the pair evaluates it, and
//! refreshed every step. Two pieces provide that:
//!
//! - [`logistic_mean0var1`] hashes `(seed, id_lo, id_hi)` into a zero-mean,
//!   unit-variance variate through a few rounds of the chaotic logistic map;
//! - [`StepRandomGen`] draws one fresh seed per time step, keyed on the
//!   simulation clock, so consecutive steps are uncorrelated.

use meso_types::{Real, SimulationState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of logistic-map rounds. Each round doubles the decorrelation of
/// the trigonometric argument; ten rounds are enough for single precision.
const LOGISTIC_ROUNDS: u32 = 10;

/// Golden-ratio based constants folding the three inputs into one argument.
const SQRT2_M1: f64 = 0.414_213_562_373_095_04; // sqrt(2) - 1
const SQRT3_M1: f64 = 0.732_050_807_568_877_3; // sqrt(3) - 1

fn logistic_rounds(x: f64) -> f64 {
    // r = 4 logistic map expressed through cos(2^n pi x): chaotic yet exactly
    // reproducible for identical inputs.
    let mut v = (x * std::f64::consts::PI).cos();
    for _ in 0..LOGISTIC_ROUNDS {
        v = 2.0 * v * v - 1.0;
    }
    v
}

/// Zero-mean unit-variance variate, symmetric under exchange of `i` and `j`.
///
/// Callers pass the pair ids in sorted order so that both particles of a
/// pair observe the same value.
#[must_use]
pub fn logistic_mean0var1(seed: Real, i: u64, j: u64) -> Real {
    debug_assert!(i <= j);
    let a = f64::from(seed).mul_add(SQRT2_M1, (i % (1 << 24)) as f64 * SQRT3_M1);
    let b = (j % (1 << 24)) as f64 * SQRT2_M1;
    // cos of a chaotic angle is uniform-ish on [-1, 1] with variance 1/2;
    // scale to unit variance.
    let u = logistic_rounds(a + b + f64::from(seed));
    (u * std::f64::consts::SQRT_2) as Real
}

/// Per-step seed generator.
///
/// Every call within one step returns the same seed; the sequence across
/// steps has vanishing autocorrelation. The generator state is keyed on the
/// simulation time so that a restarted run reproduces the same seeds.
#[derive(Debug, Clone)]
pub struct StepRandomGen {
    base_seed: u64,
    cached_step: i64,
    cached: Real,
}

impl StepRandomGen {
    /// Create a generator from a base seed.
    #[must_use]
    pub fn new(base_seed: u64) -> Self {
        Self {
            base_seed,
            cached_step: i64::MIN,
            cached: 0.0,
        }
    }

    /// Seed for the current step.
    pub fn generate(&mut self, state: &SimulationState) -> Real {
        if state.step != self.cached_step {
            let t_bits = u64::from(state.t.to_bits());
            let mut rng = StdRng::seed_from_u64(
                self.base_seed ^ t_bits.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ state.step as u64,
            );
            self.cached = rng.gen_range(0.001..1.0);
            self.cached_step = state.step;
        }
        self.cached
    }
}
