//! Intermediate density kernels.
//!
//! These accumulate the smoothed number density `rho_i = sum_j m_j w(r_ij)`
//! consumed by MDPD and SDPD force kernels later in the step.

use meso_types::{Real, Vector3};

use super::{PairParticle, PairwiseKernel};

/// A normalized density weight function on `[0, rc]`.
pub trait DensityWeight: Clone {
    /// Evaluate the weight at separation `r`.
    fn w(&self, r: Real, rc: Real) -> Real;
}

/// The simple MDPD weight `15 / (2 pi rc^3) (1 - r/rc)^2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MdpdDensityWeight;

impl DensityWeight for MdpdDensityWeight {
    fn w(&self, r: Real, rc: Real) -> Real {
        let q = 1.0 - r / rc;
        15.0 / (2.0 * std::f32::consts::PI * rc * rc * rc) * q * q
    }
}

/// Wendland C2 kernel `21 / (2 pi rc^3) (1 - q)^4 (1 + 4 q)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WendlandC2Weight;

impl WendlandC2Weight {
    /// Radial derivative `dw/dr`, used by the SDPD pressure gradient.
    #[must_use]
    pub fn dw_dr(r: Real, rc: Real) -> Real {
        let q = r / rc;
        if q >= 1.0 {
            return 0.0;
        }
        let c = 21.0 / (2.0 * std::f32::consts::PI * rc * rc * rc);
        // d/dq [(1-q)^4 (1+4q)] = -20 q (1-q)^3
        c * (-20.0 * q * (1.0 - q).powi(3)) / rc
    }
}

impl DensityWeight for WendlandC2Weight {
    fn w(&self, r: Real, rc: Real) -> Real {
        let q = r / rc;
        if q >= 1.0 {
            return 0.0;
        }
        let c = 21.0 / (2.0 * std::f32::consts::PI * rc * rc * rc);
        c * (1.0 - q).powi(4) * (1.0 + 4.0 * q)
    }
}

/// Pairwise density accumulation with weight `W`.
#[derive(Debug, Clone)]
pub struct DensityKernel<W: DensityWeight> {
    rc: Real,
    weight: W,
}

impl<W: DensityWeight> DensityKernel<W> {
    /// Create a density kernel.
    #[must_use]
    pub fn new(rc: Real, weight: W) -> Self {
        Self { rc, weight }
    }
}

impl<W: DensityWeight> PairwiseKernel for DensityKernel<W> {
    type Out = Real;

    fn rc(&self) -> Real {
        self.rc
    }

    fn self_contribution(&self) -> bool {
        true
    }

    fn pair(&self, dst: &PairParticle, src: &PairParticle) -> Real {
        let dr: Vector3<Real> = dst.r - src.r;
        let rij2 = dr.norm_squared();
        if rij2 > self.rc * self.rc {
            return 0.0;
        }
        src.mass * self.weight.w(rij2.sqrt(), self.rc)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_wendland_normalization() {
        // Radial integral of 4 pi r^2 w(r) over [0, rc] should be 1.
        let rc = 1.3;
        let n = 4000;
        let h = rc / n as Real;
        let mut integral = 0.0f64;
        let w = WendlandC2Weight;
        for i in 0..n {
            let r = (i as Real + 0.5) * h;
            integral +=
                f64::from(4.0 * std::f32::consts::PI * r * r * w.w(r, rc)) * f64::from(h);
        }
        assert_relative_eq!(integral, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_mdpd_weight_normalization() {
        let rc = 1.0;
        let n = 4000;
        let h = rc / n as Real;
        let mut integral = 0.0f64;
        let w = MdpdDensityWeight;
        for i in 0..n {
            let r = (i as Real + 0.5) * h;
            integral +=
                f64::from(4.0 * std::f32::consts::PI * r * r * w.w(r, rc)) * f64::from(h);
        }
        assert_relative_eq!(integral, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_wendland_derivative_sign() {
        assert!(WendlandC2Weight::dw_dr(0.5, 1.0) < 0.0);
        assert_eq!(WendlandC2Weight::dw_dr(1.5, 1.0), 0.0);
    }

    #[test]
    fn test_self_contribution_enabled() {
        let k = DensityKernel::new(1.0, WendlandC2Weight);
        assert!(k.self_contribution());
    }
}
