//! Velocity-Verlet with pluggable forcing.
//!
//! The fused half-shifted scheme: with the forces of the step already
//! accumulated,
//!
//! ```text
//! v_{n+1/2} = v_{n-1/2} + dt (F + F_extra) / m
//! x_{n+1}   = x_n + dt v_{n+1/2}
//! ```
//!
//! `F_extra` comes from a [`Forcing`] hook: nothing, a constant pressure
//! term, or the periodic Poiseuille body force.

use meso_types::{DomainInfo, Real, Result, SimulationState, Vector3};
use rayon::prelude::*;

use super::{save_old_positions, Integrator};
use crate::pvs::{channel_names, AnyVector};

/// Extra body force evaluated per particle.
pub trait Forcing: Send + Sync {
    /// Extra force at a local-frame position.
    fn extra(&self, r_local: Vector3<Real>, domain: &DomainInfo) -> Vector3<Real>;
}

/// No extra force.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoForcing;

impl Forcing for NoForcing {
    fn extra(&self, _r: Vector3<Real>, _domain: &DomainInfo) -> Vector3<Real> {
        Vector3::zeros()
    }
}

/// Constant extra force on every particle.
#[derive(Debug, Clone, Copy)]
pub struct ConstForcing(pub Vector3<Real>);

impl Forcing for ConstForcing {
    fn extra(&self, _r: Vector3<Real>, _domain: &DomainInfo) -> Vector3<Real> {
        self.0
    }
}

/// Periodic Poiseuille forcing: particles in one half of the domain along
/// the switch axis are pushed with `+F` along the flow axis, the other half
/// with `-F`. Flow along x switches along y, y along z, z along x.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicPoiseuille {
    /// Force magnitude.
    pub force: Real,
    /// Flow axis (0 = x, 1 = y, 2 = z).
    pub direction: usize,
}

impl Forcing for PeriodicPoiseuille {
    fn extra(&self, r_local: Vector3<Real>, domain: &DomainInfo) -> Vector3<Real> {
        let switch = (self.direction + 1) % 3;
        let global = domain.local_to_global(r_local);
        let sign = if global[switch] < 0.5 * domain.global_size[switch] {
            1.0
        } else {
            -1.0
        };
        let mut f = Vector3::zeros();
        f[self.direction] = sign * self.force;
        f
    }
}

/// Velocity-Verlet integrator.
#[derive(Debug)]
pub struct VelocityVerlet<F: Forcing = NoForcing> {
    name: String,
    forcing: F,
}

impl VelocityVerlet<NoForcing> {
    /// Plain velocity-Verlet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            forcing: NoForcing,
        }
    }
}

impl VelocityVerlet<ConstForcing> {
    /// Velocity-Verlet with a constant extra force.
    #[must_use]
    pub fn with_const_force(name: impl Into<String>, force: Vector3<Real>) -> Self {
        Self {
            name: name.into(),
            forcing: ConstForcing(force),
        }
    }
}

impl VelocityVerlet<PeriodicPoiseuille> {
    /// Velocity-Verlet with the periodic Poiseuille body force.
    ///
    /// `direction` is `"x"`, `"y"` or `"z"`.
    ///
    /// # Errors
    ///
    /// Unknown direction string.
    pub fn with_periodic_force(
        name: impl Into<String>,
        force: Real,
        direction: &str,
    ) -> Result<Self> {
        let direction = match direction {
            "x" => 0,
            "y" => 1,
            "z" => 2,
            other => {
                return Err(meso_types::SimError::invalid_config(format!(
                    "invalid direction '{other}' (expected x, y or z)"
                )))
            }
        };
        Ok(Self {
            name: name.into(),
            forcing: PeriodicPoiseuille { force, direction },
        })
    }
}

impl<F: Forcing> Integrator for VelocityVerlet<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_prerequisites(&self, pv: &mut AnyVector) {
        save_old_positions(&mut pv.pv_mut().local);
    }

    fn stage2(
        &mut self,
        state: &SimulationState,
        domain: &DomainInfo,
        pv: &mut AnyVector,
    ) -> Result<()> {
        let dt = state.dt;
        let inv_m = 1.0 / pv.mass();
        let set = &mut pv.pv_mut().local;
        save_old_positions(set);

        let forcing = &self.forcing;
        let crate::pvs::ParticleSet {
            positions,
            velocities,
            channels,
            ..
        } = set;
        let Some(forces) = channels.vector(channel_names::FORCES) else {
            return Ok(());
        };

        positions
            .par_iter_mut()
            .zip(velocities.par_iter_mut())
            .zip(forces.par_iter())
            .for_each(|((x, v), f)| {
                let total = f + forcing.extra(*x, domain);
                *v += total * (inv_m * dt);
                *x += *v * dt;
            });
        Ok(())
    }
}
