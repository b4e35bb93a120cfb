//! Analytic bounce-back from rigid ellipsoids.

use meso_types::{Real, Result, SimError, SimulationState, Vector3};

use super::{candidates_in_aabb, Bouncer};
use crate::celllist::CellList;
use crate::pvs::{channel_names, AnyVector, RigidMotion};

const WALL_EPS: Real = 1e-4;

/// Bounce-back from the analytic surface of rigid ellipsoid vectors.
#[derive(Debug)]
pub struct BounceFromEllipsoid {
    name: String,
}

impl BounceFromEllipsoid {
    /// Create an ellipsoid bouncer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Ellipsoid implicit function in the body frame: `sum (x_k / a_k)^2 - 1`.
fn ellipsoid_f(p: Vector3<Real>, axes: Vector3<Real>) -> Real {
    let q = Vector3::new(p.x / axes.x, p.y / axes.y, p.z / axes.z);
    q.norm_squared() - 1.0
}

fn ellipsoid_grad(p: Vector3<Real>, axes: Vector3<Real>) -> Vector3<Real> {
    Vector3::new(
        2.0 * p.x / (axes.x * axes.x),
        2.0 * p.y / (axes.y * axes.y),
        2.0 * p.z / (axes.z * axes.z),
    )
}

#[allow(clippy::too_many_arguments)]
fn bounce_one(
    motion: &mut RigidMotion,
    axes: Vector3<Real>,
    x_old: Vector3<Real>,
    x_new: &mut Vector3<Real>,
    v: &mut Vector3<Real>,
    mass: Real,
    dt: Real,
) -> bool {
    let to_body = |x: Vector3<Real>| motion.q.inverse_transform_vector(&(x - motion.com));
    let new_b = to_body(*x_new);
    if ellipsoid_f(new_b, axes) >= 0.0 {
        return false;
    }

    let old_b = to_body(x_old);
    // The old position may already be inside (deep overlap at start-up);
    // then push the particle out along the gradient instead of tracing the
    // trajectory.
    let surface_b = if ellipsoid_f(old_b, axes) <= 0.0 {
        let g = ellipsoid_grad(new_b, axes);
        let step = -ellipsoid_f(new_b, axes) / g.norm_squared().max(1e-12);
        new_b + g * step
    } else {
        // Bisection for the crossing time along the straight segment.
        let (mut t_out, mut t_in) = (0.0 as Real, 1.0 as Real);
        for _ in 0..24 {
            let mid = 0.5 * (t_out + t_in);
            let p = old_b + (new_b - old_b) * mid;
            if ellipsoid_f(p, axes) > 0.0 {
                t_out = mid;
            } else {
                t_in = mid;
            }
        }
        old_b + (new_b - old_b) * t_out
    };

    let normal_b = ellipsoid_grad(surface_b, axes).normalize();
    let surface_w = motion.com + motion.q.transform_vector(&surface_b);
    let normal_w = motion.q.transform_vector(&normal_b);

    let r = surface_w - motion.com;
    let u_surf = motion.point_velocity(r);

    let v_old = *v;
    let v_new = 2.0 * u_surf - v_old;

    *x_new = surface_w + normal_w * WALL_EPS;
    *v = v_new;

    // Feed the momentum change back to the body.
    let dp = (v_new - v_old) * mass;
    motion.force -= dp / dt;
    motion.torque -= r.cross(&dp) / dt;
    true
}

impl Bouncer for BounceFromEllipsoid {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounce(
        &mut self,
        state: &SimulationState,
        ov: &mut AnyVector,
        pv: &mut AnyVector,
        cl: &CellList,
        halo: bool,
    ) -> Result<()> {
        let mass = pv.mass();
        let dt = state.dt;
        let rov = ov.as_rigid_mut().ok_or_else(|| {
            SimError::invalid_config("ellipsoid bouncer needs a rigid ellipsoid vector")
        })?;
        let axes = rov.semi_axes.ok_or_else(|| {
            SimError::invalid_config("ellipsoid bouncer needs ellipsoid semi-axes")
        })?;
        let bbox_r = axes.norm();

        let set = &mut pv.pv_mut().local;
        let old_positions: Vec<Vector3<Real>> = set
            .channels
            .vector(channel_names::OLD_POSITIONS)
            .map(<[Vector3<Real>]>::to_vec)
            .ok_or_else(|| {
                SimError::invalid_config(
                    "bounce-back requires the old_positions channel (set an integrator first)",
                )
            })?;

        let motions = if halo {
            &mut rov.halo_motions
        } else {
            &mut rov.motions
        };

        for motion in motions.iter_mut() {
            let margin = Vector3::new(bbox_r, bbox_r, bbox_r);
            for i in candidates_in_aabb(cl, motion.com - margin, motion.com + margin) {
                let x_old = old_positions[i];
                let x = &mut set.positions[i];
                let v = &mut set.velocities[i];
                bounce_one(motion, axes, x_old, x, v, mass, dt);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use meso_types::UnitQuaternion;

    #[test]
    fn test_particle_reflected_off_resting_sphere() {
        let mut motion = RigidMotion::at_rest(Vector3::zeros(), UnitQuaternion::identity());
        let axes = Vector3::new(1.0, 1.0, 1.0);
        // Flying along -x, ends inside the sphere.
        let x_old = Vector3::new(1.5, 0.0, 0.0);
        let mut x = Vector3::new(0.7, 0.0, 0.0);
        let mut v = Vector3::new(-8.0, 0.0, 0.0);

        assert!(bounce_one(&mut motion, axes, x_old, &mut x, &mut v, 1.0, 0.1));
        // Reflected and placed just outside the surface.
        assert!(v.x > 7.9, "velocity reversed, got {v:?}");
        assert!(ellipsoid_f(x, axes) > 0.0, "particle outside, got {x:?}");
        // The body absorbed the opposite momentum.
        assert!(motion.force.x < 0.0);
    }

    #[test]
    fn test_outside_particle_untouched() {
        let mut motion = RigidMotion::at_rest(Vector3::zeros(), UnitQuaternion::identity());
        let axes = Vector3::new(1.0, 1.0, 1.0);
        let x_old = Vector3::new(2.5, 0.0, 0.0);
        let mut x = Vector3::new(2.0, 0.0, 0.0);
        let mut v = Vector3::new(-1.0, 0.0, 0.0);
        assert!(!bounce_one(&mut motion, axes, x_old, &mut x, &mut v, 1.0, 0.1));
        assert_eq!(v, Vector3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_moving_body_imparts_velocity() {
        let mut motion = RigidMotion::at_rest(Vector3::zeros(), UnitQuaternion::identity());
        motion.vel = Vector3::new(1.0, 0.0, 0.0);
        let axes = Vector3::new(1.0, 1.0, 1.0);
        let x_old = Vector3::new(1.5, 0.0, 0.0);
        let mut x = Vector3::new(0.8, 0.0, 0.0);
        let mut v = Vector3::zeros();
        assert!(bounce_one(&mut motion, axes, x_old, &mut x, &mut v, 1.0, 0.1));
        // v_new = 2 u_surf - v_old = 2.
        assert!((v.x - 2.0).abs() < 1e-4);
    }
}
