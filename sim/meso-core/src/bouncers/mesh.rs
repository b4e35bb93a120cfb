//! Bounce-back from triangle-mesh surfaces.
//!
//! Works for deformable membranes and for rigid objects carrying a surface
//! mesh. Collisions are resolved against the *moving* triangles: both the
//! particle and the triangle vertices are interpolated linearly over the
//! step, the crossing time is found by sampling plus bisection, and the
//! particle is reflected off the surface velocity at the impact point. The
//! momentum change goes back to the triangle vertices (membranes) or to the
//! rigid motion (rigid objects).

use meso_types::{Real, Result, SimError, SimulationState, Vector3};

use super::{candidates_in_aabb, Bouncer};
use crate::celllist::CellList;
use crate::pvs::{channel_names, AnyVector};
use crate::rng::logistic_mean0var1;

const SURFACE_EPS: Real = 1e-4;
const TIME_SAMPLES: usize = 8;

/// Bounce-back from mesh surfaces, with an optional thermal kick.
#[derive(Debug)]
pub struct BounceFromMesh {
    name: String,
    kbt: Real,
    seed: Real,
}

impl BounceFromMesh {
    /// Create a mesh bouncer. `kbt > 0` adds a thermal kick to reflected
    /// velocities.
    #[must_use]
    pub fn new(name: impl Into<String>, kbt: Real) -> Self {
        Self {
            name: name.into(),
            kbt,
            seed: 0.0,
        }
    }
}

struct TriangleTrack {
    old: [Vector3<Real>; 3],
    new: [Vector3<Real>; 3],
}

impl TriangleTrack {
    fn at(&self, t: Real) -> [Vector3<Real>; 3] {
        [
            self.old[0] + (self.new[0] - self.old[0]) * t,
            self.old[1] + (self.new[1] - self.old[1]) * t,
            self.old[2] + (self.new[2] - self.old[2]) * t,
        ]
    }

    fn vertex_velocity(&self, w: [Real; 3], dt: Real) -> Vector3<Real> {
        ((self.new[0] - self.old[0]) * w[0]
            + (self.new[1] - self.old[1]) * w[1]
            + (self.new[2] - self.old[2]) * w[2])
            / dt
    }
}

fn signed_distance(p: Vector3<Real>, tri: &[Vector3<Real>; 3]) -> Real {
    let n = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
    (p - tri[0]).dot(&n)
}

fn barycentric(p: Vector3<Real>, tri: &[Vector3<Real>; 3]) -> Option<[Real; 3]> {
    let v0 = tri[1] - tri[0];
    let v1 = tri[2] - tri[0];
    let v2 = p - tri[0];
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-12 {
        return None;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    let u = 1.0 - v - w;
    let tol = -1e-3;
    if u > tol && v > tol && w > tol {
        Some([u, v, w])
    } else {
        None
    }
}

/// Find the first crossing time of the moving point through the moving
/// triangle plane, then validate it lies inside the triangle.
fn find_collision(
    x_old: Vector3<Real>,
    x_new: Vector3<Real>,
    track: &TriangleTrack,
) -> Option<(Real, [Real; 3])> {
    let point_at = |t: Real| x_old + (x_new - x_old) * t;
    let f = |t: Real| signed_distance(point_at(t), &track.at(t));

    let mut prev_t = 0.0;
    let mut prev_f = f(0.0);
    for s in 1..=TIME_SAMPLES {
        let t = s as Real / TIME_SAMPLES as Real;
        let ft = f(t);
        if prev_f == 0.0 || prev_f.signum() != ft.signum() {
            // Bisect within [prev_t, t].
            let (mut a, mut b) = (prev_t, t);
            let fa = prev_f;
            for _ in 0..24 {
                let m = 0.5 * (a + b);
                if f(m).signum() == fa.signum() {
                    a = m;
                } else {
                    b = m;
                }
            }
            let t_hit = 0.5 * (a + b);
            if let Some(w) = barycentric(point_at(t_hit), &track.at(t_hit)) {
                return Some((t_hit, w));
            }
        }
        prev_t = t;
        prev_f = ft;
    }
    None
}

impl BounceFromMesh {
    #[allow(clippy::too_many_arguments)]
    fn bounce_mesh_objects(
        &self,
        state: &SimulationState,
        ov: &mut AnyVector,
        pv: &mut AnyVector,
        cl: &CellList,
        halo: bool,
    ) -> Result<()> {
        let dt = state.dt;
        let mass = pv.mass();

        // Object side: mesh, current and old vertex positions, force sink.
        let (mesh, is_rigid) = match &*ov {
            AnyVector::Membrane(mv) => (mv.mesh.clone(), false),
            AnyVector::Rigid(rov) => (
                rov.mesh
                    .clone()
                    .ok_or_else(|| {
                        SimError::invalid_config("mesh bouncer needs an object surface mesh")
                    })?,
                true,
            ),
            AnyVector::Plain(_) => {
                return Err(SimError::invalid_config(
                    "mesh bouncer needs an object vector",
                ))
            }
        };

        let nv = mesh.n_vertices();
        let obj_set = if halo { &ov.pv().halo } else { &ov.pv().local };
        let n_objects = if nv == 0 { 0 } else { obj_set.len() / nv };
        let obj_positions = obj_set.positions.clone();
        let obj_old: Vec<Vector3<Real>> = obj_set
            .channels
            .vector(channel_names::OLD_POSITIONS)
            .map_or_else(|| obj_positions.clone(), <[Vector3<Real>]>::to_vec);

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

        let mut vertex_impulses = vec![Vector3::<Real>::zeros(); obj_set.len()];

        for obj in 0..n_objects {
            let base = obj * nv;
            for (tri_idx, face) in mesh.faces().iter().enumerate() {
                let track = TriangleTrack {
                    old: [
                        obj_old[base + face[0] as usize],
                        obj_old[base + face[1] as usize],
                        obj_old[base + face[2] as usize],
                    ],
                    new: [
                        obj_positions[base + face[0] as usize],
                        obj_positions[base + face[1] as usize],
                        obj_positions[base + face[2] as usize],
                    ],
                };

                let mut lo = track.old[0];
                let mut hi = track.old[0];
                for p in track.old.iter().chain(track.new.iter()) {
                    lo = lo.inf(p);
                    hi = hi.sup(p);
                }
                let margin = Vector3::new(0.2, 0.2, 0.2);

                for i in candidates_in_aabb(cl, lo - margin, hi + margin) {
                    let x_old = old_positions[i];
                    let x_new = set.positions[i];
                    let Some((t_hit, w)) = find_collision(x_old, x_new, &track) else {
                        continue;
                    };

                    let tri = track.at(t_hit);
                    let n = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
                    let n_hat = n / n.norm().max(1e-12);
                    // Return the particle to the side it came from.
                    let side = signed_distance(x_old, &track.at(0.0)).signum();

                    let hit = x_old + (x_new - x_old) * t_hit;
                    let u_surf = track.vertex_velocity(w, dt);

                    let v_old = set.velocities[i];
                    let mut v_new = 2.0 * u_surf - v_old;
                    if self.kbt > 0.0 {
                        let id = set.ids[i].raw();
                        let sigma = (self.kbt / mass).sqrt();
                        for axis in 0..3u64 {
                            v_new[axis as usize] +=
                                sigma * logistic_mean0var1(self.seed, id, (tri_idx as u64) * 3 + axis);
                        }
                    }

                    set.positions[i] = hit + n_hat * (SURFACE_EPS * side);
                    set.velocities[i] = v_new;

                    let dp = (v_new - v_old) * mass;
                    for k in 0..3 {
                        vertex_impulses[base + face[k] as usize] -= dp * (w[k] / dt);
                    }
                }
            }
        }

        // Feed the reaction back to the objects. Membrane vertices take it
        // as an immediate velocity impulse; rigid bodies as a wrench
        // consumed by their next integration.
        match ov {
            AnyVector::Membrane(mv) => {
                let vertex_mass = mv.pv.mass;
                let obj_set = if halo { &mut mv.pv.halo } else { &mut mv.pv.local };
                for (v, imp) in obj_set.velocities.iter_mut().zip(&vertex_impulses) {
                    *v += imp * (dt / vertex_mass);
                }
            }
            AnyVector::Rigid(rov) => {
                debug_assert!(is_rigid);
                let motions = if halo {
                    &mut rov.halo_motions
                } else {
                    &mut rov.motions
                };
                for (obj, motion) in motions.iter_mut().enumerate() {
                    let base = obj * nv;
                    for (k, imp) in vertex_impulses[base..base + nv].iter().enumerate() {
                        motion.force += imp;
                        let r = obj_positions[base + k] - motion.com;
                        motion.torque += r.cross(imp);
                    }
                }
            }
            AnyVector::Plain(_) => {}
        }
        Ok(())
    }
}

impl Bouncer for BounceFromMesh {
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
        self.seed = state.t + state.step as Real;
        self.bounce_mesh_objects(state, ov, pv, cl, halo)
    }
}
