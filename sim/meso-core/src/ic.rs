//! Initial conditions: how registered particle vectors get filled.

use meso_types::{DomainInfo, ParticleId, Real, Result, SimError, UnitQuaternion, Vector3};
use nalgebra::Quaternion;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::info;

use crate::pvs::{AnyVector, Persistence, RigidMotion};

/// Fills a freshly registered particle vector.
pub trait InitialConditions {
    /// Generate the initial particle distribution.
    ///
    /// # Errors
    ///
    /// Mismatched vector kinds or inconsistent parameters.
    fn exec(&self, pv: &mut AnyVector, domain: &DomainInfo) -> Result<()>;
}

/// Base for the particle ids of one vector, derived from its name so that
/// ids of different vectors do not collide (pairwise random kernels key on
/// the id pair).
fn id_base(name: &str) -> u64 {
    name.bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
        << 24
}

/// Write object indices into the persistent `object_tags` channel so
/// object-aware kernels can recognize same-object pairs.
pub(crate) fn fill_object_tags(pv: &mut AnyVector) {
    let Some(object_size) = pv.object_size() else {
        return;
    };
    if object_size == 0 {
        return;
    }
    let set = &mut pv.pv_mut().local;
    let n = set.len();
    set.channels
        .require_scalar("object_tags", n, Persistence::Persistent);
    if let Some(tags) = set.channels.scalar_mut("object_tags") {
        for (i, tag) in tags.iter_mut().enumerate() {
            *tag = (i / object_size) as Real;
        }
    }
}

/// Uniform random filling with the given number density.
#[derive(Debug, Clone, Copy)]
pub struct UniformIc {
    /// Target number density.
    pub density: Real,
    /// RNG seed.
    pub seed: u64,
}

impl UniformIc {
    /// Create a uniform IC.
    #[must_use]
    pub fn new(density: Real) -> Self {
        Self {
            density,
            seed: 0x1c_eb00da,
        }
    }
}

impl InitialConditions for UniformIc {
    fn exec(&self, pv: &mut AnyVector, domain: &DomainInfo) -> Result<()> {
        if pv.is_object() {
            return Err(SimError::invalid_config(
                "uniform initial conditions need a plain particle vector",
            ));
        }
        let n = (self.density as f64 * domain.local_volume()).round() as usize;
        let base = id_base(pv.name());
        let mut rng = StdRng::seed_from_u64(self.seed);
        let set = &mut pv.pv_mut().local;
        for i in 0..n {
            let mut p = Vector3::zeros();
            for k in 0..3 {
                p[k] = (rng.gen::<Real>() - 0.5) * domain.local_size[k];
            }
            let v = Vector3::new(
                rng.sample::<Real, _>(StandardNormal),
                rng.sample::<Real, _>(StandardNormal),
                rng.sample::<Real, _>(StandardNormal),
            );
            set.push(p, v, ParticleId::new(base + i as u64));
        }
        info!(pv = %pv.name(), count = n, "uniform initial conditions");
        Ok(())
    }
}

/// One row of a rigid or membrane placement: global center of mass plus an
/// orientation quaternion `(w, x, y, z)`.
#[derive(Debug, Clone, Copy)]
pub struct ComQ {
    /// Center of mass, global coordinates.
    pub com: Vector3<Real>,
    /// Orientation.
    pub q: UnitQuaternion<Real>,
}

impl ComQ {
    /// Build from the seven-number row format `[x y z qw qx qy qz]`.
    #[must_use]
    pub fn from_row(row: [Real; 7]) -> Self {
        Self {
            com: Vector3::new(row[0], row[1], row[2]),
            q: UnitQuaternion::from_quaternion(Quaternion::new(row[3], row[4], row[5], row[6])),
        }
    }
}

/// Rigid objects at the given poses, with body-frame template coordinates.
#[derive(Debug, Clone)]
pub struct RigidIc {
    /// Poses, one object each.
    pub com_q: Vec<ComQ>,
    /// Frozen-particle template (body frame); must match the vector's
    /// object size.
    pub coords: Vec<Vector3<Real>>,
}

impl InitialConditions for RigidIc {
    fn exec(&self, pv: &mut AnyVector, domain: &DomainInfo) -> Result<()> {
        let rov = pv.as_rigid_mut().ok_or_else(|| {
            SimError::invalid_config("rigid initial conditions need a rigid object vector")
        })?;
        if self.coords.len() != rov.object_size {
            return Err(SimError::invalid_config(format!(
                "rigid template has {} coordinates but the object size is {}",
                self.coords.len(),
                rov.object_size
            )));
        }

        rov.template = self.coords.clone();
        let mut next_id = id_base(&rov.pv.name);
        for cq in &self.com_q {
            rov.motions
                .push(RigidMotion::at_rest(domain.global_to_local(cq.com), cq.q));
            for _ in 0..rov.object_size {
                rov.pv
                    .local
                    .push(Vector3::zeros(), Vector3::zeros(), ParticleId::new(next_id));
                next_id += 1;
            }
        }
        rov.project_all();
        info!(
            pv = %rov.pv.name,
            objects = rov.n_objects(),
            particles = rov.pv.local.len(),
            "rigid initial conditions"
        );
        fill_object_tags(pv);
        Ok(())
    }
}

/// Membrane instances at the given poses.
#[derive(Debug, Clone)]
pub struct MembraneIc {
    /// Poses, one membrane each.
    pub com_q: Vec<ComQ>,
    /// Uniform scaling applied to the mesh.
    pub global_scale: Real,
}

impl MembraneIc {
    /// Create a membrane IC at unit scale.
    #[must_use]
    pub fn new(com_q: Vec<ComQ>) -> Self {
        Self {
            com_q,
            global_scale: 1.0,
        }
    }
}

impl InitialConditions for MembraneIc {
    fn exec(&self, pv: &mut AnyVector, domain: &DomainInfo) -> Result<()> {
        let mv = pv.as_membrane_mut().ok_or_else(|| {
            SimError::invalid_config("membrane initial conditions need a membrane vector")
        })?;
        let mesh = mv.mesh.clone();
        let mut next_id = id_base(&mv.pv.name);
        for cq in &self.com_q {
            let com_local = domain.global_to_local(cq.com);
            for v in mesh.vertices() {
                let p = com_local + cq.q * (v * self.global_scale);
                mv.pv
                    .local
                    .push(p, Vector3::zeros(), ParticleId::new(next_id));
                next_id += 1;
            }
        }
        info!(
            pv = %mv.pv.name,
            objects = mv.n_objects(),
            particles = mv.pv.local.len(),
            "membrane initial conditions"
        );
        fill_object_tags(pv);
        Ok(())
    }
}
