//! Classical dissipative particle dynamics.
//!
//! The pair force along the unit separation `e` is
//!
//! ```text
//! F = a (1 - r/rc) e                      conservative
//!   - gamma w(r)^2 (e . dv) e            dissipative
//!   + sigma w(r) xi e                     random
//! ```
//!
//! with `w(r) = (1 - r/rc)^power`, `sigma = sqrt(2 gamma kBT / dt)` and
//! `xi` the symmetric per-pair variate of the step.

use meso_types::{Real, SimulationState, Vector3};

use super::{PairParticle, PairwiseKernel};
use crate::rng::{logistic_mean0var1, StepRandomGen};

/// DPD pair kernel.
#[derive(Debug, Clone)]
pub struct DpdKernel {
    rc: Real,
    a: Real,
    gamma: Real,
    kbt: Real,
    power: Real,
    inv_rc: Real,
    sigma: Real,
    seed: Real,
    step_gen: StepRandomGen,
}

impl DpdKernel {
    /// Create a DPD kernel. `sigma` is derived from the fluctuation-
    /// dissipation relation at setup time, once the timestep is known.
    #[must_use]
    pub fn new(rc: Real, a: Real, gamma: Real, kbt: Real, power: Real, seed: u64) -> Self {
        Self {
            rc,
            a,
            gamma,
            kbt,
            power,
            inv_rc: 1.0 / rc,
            sigma: 0.0,
            seed: 0.0,
            step_gen: StepRandomGen::new(seed),
        }
    }

    /// Conservative amplitude.
    #[must_use]
    pub fn a(&self) -> Real {
        self.a
    }

    /// Friction coefficient.
    #[must_use]
    pub fn gamma(&self) -> Real {
        self.gamma
    }
}

impl PairwiseKernel for DpdKernel {
    type Out = Vector3<Real>;

    fn rc(&self) -> Real {
        self.rc
    }

    fn setup(&mut self, state: &SimulationState) {
        self.sigma = (2.0 * self.gamma * self.kbt / state.dt).sqrt();
        self.seed = self.step_gen.generate(state);
    }

    fn pair(&self, dst: &PairParticle, src: &PairParticle) -> Vector3<Real> {
        let dr = dst.r - src.r;
        let rij2 = dr.norm_squared();
        if rij2 > self.rc * self.rc || rij2 == 0.0 {
            return Vector3::zeros();
        }

        let rij = rij2.sqrt();
        let argwr = 1.0 - rij * self.inv_rc;
        let wr = argwr.powf(self.power);

        let e = dr / rij;
        let du = dst.u - src.u;
        let rdotv = e.dot(&du);

        let xi = logistic_mean0var1(self.seed, dst.id.min(src.id), dst.id.max(src.id));

        let strength = self.a * argwr - (self.gamma * wr * rdotv + self.sigma * xi) * wr;
        e * strength
    }
}
