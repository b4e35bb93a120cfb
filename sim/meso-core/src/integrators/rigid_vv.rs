//! Velocity-Verlet for rigid object vectors.
//!
//! Particle forces are reduced to a force and torque per object; the rigid
//! state (com, orientation quaternion, linear and angular velocity) is
//! advanced and the frozen template particles are re-projected onto the new
//! pose. Bounce-back wrenches accumulated on the motions since the last
//! step enter the same reduction.

use meso_types::{DomainInfo, Result, SimError, SimulationState, UnitQuaternion, Vector3};
use nalgebra::Quaternion;

use super::{save_old_positions, Integrator};
use crate::pvs::AnyVector;

/// Rigid-body velocity-Verlet.
#[derive(Debug)]
pub struct RigidVelocityVerlet {
    name: String,
}

impl RigidVelocityVerlet {
    /// Create a rigid integrator.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Integrator for RigidVelocityVerlet {
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
        let rov = pv.as_rigid_mut().ok_or_else(|| {
            SimError::invalid_config("rigid velocity-Verlet can only integrate rigid object vectors")
        })?;

        save_old_positions(&mut rov.pv.local);

        let object_size = rov.object_size;
        let inv_mass = 1.0 / rov.object_mass;
        let inertia = rov.inertia_body;

        for (obj, motion) in rov.motions.iter_mut().enumerate() {
            let base = obj * object_size;
            let mut force = motion.force;
            let mut torque = motion.torque;
            for k in 0..object_size {
                let f = rov.pv.local.forces()[base + k];
                let r = rov.pv.local.positions[base + k] - motion.com;
                force += f;
                torque += r.cross(&f);
            }

            motion.vel += force * (inv_mass * dt);

            // Angular update in the body frame, where the inertia tensor is
            // diagonal.
            let torque_body = motion.q.inverse_transform_vector(&torque);
            let omega_dot_body = Vector3::new(
                torque_body.x / inertia.x,
                torque_body.y / inertia.y,
                torque_body.z / inertia.z,
            );
            motion.omega += motion.q.transform_vector(&omega_dot_body) * dt;

            motion.com += motion.vel * dt;

            let q = motion.q.quaternion();
            let dq = Quaternion::from_imag(motion.omega) * q * 0.5;
            motion.q = UnitQuaternion::from_quaternion(q + dq * dt);

            motion.clear_wrenches();
        }

        rov.project_all();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pvs::{AnyVector, RigidMotion, RigidVector};
    use approx::assert_relative_eq;
    use meso_types::ParticleId;

    fn rigid_sphere() -> AnyVector {
        let mut rov = RigidVector::ellipsoid("ell", 1.0, 2, Vector3::new(1.0, 1.0, 1.0), None);
        rov.template = vec![Vector3::new(0.5, 0.0, 0.0), Vector3::new(-0.5, 0.0, 0.0)];
        rov.motions.push(RigidMotion::at_rest(
            Vector3::zeros(),
            UnitQuaternion::identity(),
        ));
        for _ in 0..2 {
            rov.pv
                .local
                .push(Vector3::zeros(), Vector3::zeros(), ParticleId::new(0));
        }
        rov.project_all();
        AnyVector::Rigid(rov)
    }

    #[test]
    fn test_constant_force_accelerates_com() {
        let mut pv = rigid_sphere();
        {
            let rov = pv.as_rigid_mut().unwrap();
            for f in rov.pv.local.forces_mut() {
                *f = Vector3::new(1.0, 0.0, 0.0);
            }
        }
        let state = SimulationState::new(0.1);
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        let mut vv = RigidVelocityVerlet::new("rigid_vv");
        vv.stage2(&state, &domain, &mut pv).unwrap();

        let rov = pv.as_rigid().unwrap();
        // Total force 2, mass 2: dv = dt.
        assert_relative_eq!(rov.motions[0].vel.x, 0.1, epsilon = 1e-6);
        assert_relative_eq!(rov.motions[0].com.x, 0.01, epsilon = 1e-6);
        // Particles follow the body.
        assert_relative_eq!(rov.pv.local.positions[0].x, 0.51, epsilon = 1e-5);
    }

    #[test]
    fn test_torque_spins_body() {
        let mut pv = rigid_sphere();
        {
            let rov = pv.as_rigid_mut().unwrap();
            rov.motions[0].torque = Vector3::new(0.0, 0.0, 1.0);
        }
        let state = SimulationState::new(0.1);
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        let mut vv = RigidVelocityVerlet::new("rigid_vv");
        vv.stage2(&state, &domain, &mut pv).unwrap();

        let rov = pv.as_rigid().unwrap();
        assert!(rov.motions[0].omega.z > 0.0);
        // Wrench accumulators are consumed.
        assert_eq!(rov.motions[0].torque, Vector3::zeros());
    }

    #[test]
    fn test_rejects_plain_vector() {
        let mut pv = AnyVector::Plain(crate::pvs::ParticleVector::new("pv", 1.0));
        let state = SimulationState::new(0.1);
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        let mut vv = RigidVelocityVerlet::new("rigid_vv");
        assert!(vv.stage2(&state, &domain, &mut pv).is_err());
    }
}
