//! Prescribed-motion integrators: particles move with an imposed velocity
//! field regardless of the forces acting on them. Used for driven frozen
//! layers and moving boundaries.

use meso_types::{DomainInfo, Real, Result, SimulationState, Vector3};

use super::{save_old_positions, Integrator};
use crate::pvs::AnyVector;

/// Translate particles with a constant velocity.
#[derive(Debug)]
pub struct Translate {
    name: String,
    velocity: Vector3<Real>,
}

impl Translate {
    /// Create a translation integrator.
    #[must_use]
    pub fn new(name: impl Into<String>, velocity: Vector3<Real>) -> Self {
        Self {
            name: name.into(),
            velocity,
        }
    }
}

impl Integrator for Translate {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage2(
        &mut self,
        state: &SimulationState,
        _domain: &DomainInfo,
        pv: &mut AnyVector,
    ) -> Result<()> {
        let dt = state.dt;
        let set = &mut pv.pv_mut().local;
        save_old_positions(set);
        for (x, v) in set.positions.iter_mut().zip(set.velocities.iter_mut()) {
            *v = self.velocity;
            *x += self.velocity * dt;
        }
        Ok(())
    }
}

/// Move particles with the periodically changing velocity
/// `u(t) = u0 cos(2 pi t / T)`.
#[derive(Debug)]
pub struct Oscillate {
    name: String,
    velocity: Vector3<Real>,
    period: Real,
}

impl Oscillate {
    /// Create an oscillation integrator.
    #[must_use]
    pub fn new(name: impl Into<String>, velocity: Vector3<Real>, period: Real) -> Self {
        Self {
            name: name.into(),
            velocity,
            period,
        }
    }
}

impl Integrator for Oscillate {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage2(
        &mut self,
        state: &SimulationState,
        _domain: &DomainInfo,
        pv: &mut AnyVector,
    ) -> Result<()> {
        let dt = state.dt;
        let u = self.velocity
            * (2.0 * std::f32::consts::PI * state.t / self.period).cos();
        let set = &mut pv.pv_mut().local;
        save_old_positions(set);
        for (x, v) in set.positions.iter_mut().zip(set.velocities.iter_mut()) {
            *v = u;
            *x += u * dt;
        }
        Ok(())
    }
}

/// Rotate particles around a point with constant angular velocity.
#[derive(Debug)]
pub struct Rotate {
    name: String,
    center: Vector3<Real>,
    omega: Vector3<Real>,
}

impl Rotate {
    /// Create a rotation integrator; `center` is in global coordinates.
    #[must_use]
    pub fn new(name: impl Into<String>, center: Vector3<Real>, omega: Vector3<Real>) -> Self {
        Self {
            name: name.into(),
            center,
            omega,
        }
    }
}

impl Integrator for Rotate {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage2(
        &mut self,
        state: &SimulationState,
        domain: &DomainInfo,
        pv: &mut AnyVector,
    ) -> Result<()> {
        let dt = state.dt;
        let center_local = domain.global_to_local(self.center);
        let set = &mut pv.pv_mut().local;
        save_old_positions(set);
        for (x, v) in set.positions.iter_mut().zip(set.velocities.iter_mut()) {
            let u = self.omega.cross(&(*x - center_local));
            *v = u;
            *x += u * dt;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pvs::ParticleVector;
    use approx::assert_relative_eq;
    use meso_types::ParticleId;

    fn pv_at(x: Real, y: Real) -> AnyVector {
        let mut pv = ParticleVector::new("pv", 1.0);
        pv.local.push(
            Vector3::new(x, y, 0.0),
            Vector3::zeros(),
            ParticleId::new(0),
        );
        AnyVector::Plain(pv)
    }

    #[test]
    fn test_translate_ignores_forces() {
        let mut pv = pv_at(0.0, 0.0);
        pv.pv_mut().local.forces_mut()[0] = Vector3::new(100.0, 0.0, 0.0);
        let mut integrator = Translate::new("tr", Vector3::new(0.0, 1.0, 0.0));
        integrator
            .stage2(
                &SimulationState::new(0.5),
                &DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0)),
                &mut pv,
            )
            .unwrap();
        assert_relative_eq!(pv.pv().local.positions[0].y, 0.5);
        assert_relative_eq!(pv.pv().local.positions[0].x, 0.0);
    }

    #[test]
    fn test_oscillate_at_quarter_period_is_stationary() {
        let mut pv = pv_at(0.0, 0.0);
        let mut state = SimulationState::new(0.1);
        state.t = 0.25; // cos(pi/2) = 0
        let mut integrator = Oscillate::new("osc", Vector3::new(1.0, 0.0, 0.0), 1.0);
        integrator
            .stage2(
                &state,
                &DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0)),
                &mut pv,
            )
            .unwrap();
        assert!(pv.pv().local.velocities[0].norm() < 1e-6);
    }

    #[test]
    fn test_rotate_moves_tangentially() {
        // Particle at local (1, 0), center at the domain center.
        let mut pv = pv_at(1.0, 0.0);
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        let mut integrator = Rotate::new(
            "rot",
            Vector3::new(4.0, 4.0, 4.0),
            Vector3::new(0.0, 0.0, 1.0),
        );
        integrator
            .stage2(&SimulationState::new(0.01), &domain, &mut pv)
            .unwrap();
        // omega x r = z x x = +y
        assert!(pv.pv().local.velocities[0].y > 0.9);
        assert!(pv.pv().local.velocities[0].x.abs() < 1e-5);
    }
}
