//! Lennard-Jones contact forces.
//!
//! Used as a repulsive contact potential between membranes and rigid
//! objects. The force is clamped to `max_force` to keep overlapping
//! initial conditions integrable; the object-aware variant skips pairs
//! belonging to the same object.

use meso_types::{Real, Vector3};

use super::{PairParticle, PairwiseKernel};

/// Lennard-Jones pair kernel.
#[derive(Debug, Clone)]
pub struct LjKernel {
    rc: Real,
    epsilon: Real,
    sigma: Real,
    max_force: Real,
    object_aware: bool,
}

impl LjKernel {
    /// Create an LJ kernel.
    #[must_use]
    pub fn new(rc: Real, epsilon: Real, sigma: Real, max_force: Real, object_aware: bool) -> Self {
        Self {
            rc,
            epsilon,
            sigma,
            max_force,
            object_aware,
        }
    }

    /// Copy of this kernel with object awareness disabled; used when the
    /// two interacting particle vectors are distinct, where tags from
    /// different vectors must not compare equal.
    #[must_use]
    pub fn without_object_awareness(&self) -> Self {
        Self {
            object_aware: false,
            ..self.clone()
        }
    }
}

impl PairwiseKernel for LjKernel {
    type Out = Vector3<Real>;

    fn rc(&self) -> Real {
        self.rc
    }

    fn needs_tags(&self) -> bool {
        self.object_aware
    }

    fn for_cross_pair(&self) -> Self {
        self.without_object_awareness()
    }

    fn pair(&self, dst: &PairParticle, src: &PairParticle) -> Vector3<Real> {
        if self.object_aware && dst.tag != u32::MAX && dst.tag == src.tag {
            return Vector3::zeros();
        }

        let dr = dst.r - src.r;
        let rij2 = dr.norm_squared();
        if rij2 > self.rc * self.rc || rij2 == 0.0 {
            return Vector3::zeros();
        }

        let s2 = self.sigma * self.sigma / rij2;
        let s6 = s2 * s2 * s2;
        let s12 = s6 * s6;
        // F(r) = 24 eps (2 s^12 - s^6) / r along e.
        let magnitude = 24.0 * self.epsilon * (2.0 * s12 - s6) / rij2.sqrt();
        let magnitude = magnitude.clamp(-self.max_force, self.max_force);
        (dr / rij2.sqrt()) * magnitude
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn particle(x: Real, tag: u32) -> PairParticle {
        PairParticle {
            r: Vector3::new(x, 0.0, 0.0),
            u: Vector3::zeros(),
            id: 0,
            mass: 1.0,
            density: 0.0,
            tag,
        }
    }

    #[test]
    fn test_repulsive_at_close_range() {
        let k = LjKernel::new(1.0, 0.35, 0.8, 400.0, false);
        let f = k.pair(&particle(0.5, u32::MAX), &particle(0.0, u32::MAX));
        assert!(f.x > 0.0);
    }

    #[test]
    fn test_clamped() {
        let k = LjKernel::new(1.0, 0.35, 0.8, 400.0, false);
        let f = k.pair(&particle(0.05, u32::MAX), &particle(0.0, u32::MAX));
        assert!(f.norm() <= 400.0 + 1e-3);
    }

    #[test]
    fn test_object_awareness_skips_same_object() {
        let aware = LjKernel::new(1.0, 0.35, 0.8, 400.0, true);
        assert_eq!(
            aware.pair(&particle(0.5, 3), &particle(0.0, 3)),
            Vector3::zeros()
        );
        assert!(aware.pair(&particle(0.5, 3), &particle(0.0, 4)).x > 0.0);
        let unaware = aware.without_object_awareness();
        assert!(unaware.pair(&particle(0.5, 3), &particle(0.0, 3)).x > 0.0);
    }
}
