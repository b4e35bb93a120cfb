//! Object vectors: rigid bodies and membranes.
//!
//! Object vectors are particle vectors whose particles are grouped into
//! objects of fixed size. The grouping must survive reordering, which is why
//! object vectors never get primary cell lists.

use std::sync::Arc;

use meso_types::{Real, UnitQuaternion, Vector3};

use super::particle_vector::ParticleVector;
use crate::mesh::Mesh;

/// Rigid-body state of one object.
#[derive(Debug, Clone, Copy)]
pub struct RigidMotion {
    /// Center of mass, local frame.
    pub com: Vector3<Real>,
    /// Orientation.
    pub q: UnitQuaternion<Real>,
    /// Linear velocity of the center of mass.
    pub vel: Vector3<Real>,
    /// Angular velocity, world frame.
    pub omega: Vector3<Real>,
    /// Accumulated force on the body.
    pub force: Vector3<Real>,
    /// Accumulated torque about the center of mass.
    pub torque: Vector3<Real>,
}

impl RigidMotion {
    /// At-rest motion at the given pose.
    #[must_use]
    pub fn at_rest(com: Vector3<Real>, q: UnitQuaternion<Real>) -> Self {
        Self {
            com,
            q,
            vel: Vector3::zeros(),
            omega: Vector3::zeros(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    /// Zero the force and torque accumulators.
    pub fn clear_wrenches(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }

    /// Velocity of a material point at world offset `r` from the com.
    #[must_use]
    pub fn point_velocity(&self, r: Vector3<Real>) -> Vector3<Real> {
        self.vel + self.omega.cross(&r)
    }
}

/// A vector of rigid objects, each carrying `object_size` frozen particles
/// at fixed body-frame template positions.
#[derive(Debug)]
pub struct RigidVector {
    /// The underlying particles (`local`/`halo` sets).
    pub pv: ParticleVector,
    /// Particles per object.
    pub object_size: usize,
    /// Body-frame coordinates of the frozen particles.
    pub template: Vec<Vector3<Real>>,
    /// Ellipsoid semi-axes, when the shape is analytic.
    pub semi_axes: Option<Vector3<Real>>,
    /// Optional surface mesh (dumping, mesh bounce).
    pub mesh: Option<Arc<Mesh>>,
    /// Rigid state of each local object.
    pub motions: Vec<RigidMotion>,
    /// Rigid state of halo copies.
    pub halo_motions: Vec<RigidMotion>,
    /// Local object each halo copy originates from, with the applied shift.
    pub halo_origin: Vec<(usize, Vector3<Real>)>,
    /// Total mass of one object.
    pub object_mass: Real,
    /// Diagonal body-frame inertia tensor of one object.
    pub inertia_body: Vector3<Real>,
}

impl RigidVector {
    /// Create a rigid ellipsoid vector.
    ///
    /// `mass` is the mass of each frozen particle, as for plain particle
    /// vectors; the object mass is `mass * object_size`. Inertia follows the
    /// solid-ellipsoid formula.
    #[must_use]
    pub fn ellipsoid(
        name: impl Into<String>,
        mass: Real,
        object_size: usize,
        semi_axes: Vector3<Real>,
        mesh: Option<Arc<Mesh>>,
    ) -> Self {
        let object_mass = mass * object_size as Real;
        let (a2, b2, c2) = (
            semi_axes.x * semi_axes.x,
            semi_axes.y * semi_axes.y,
            semi_axes.z * semi_axes.z,
        );
        let inertia_body = Vector3::new(
            object_mass / 5.0 * (b2 + c2),
            object_mass / 5.0 * (a2 + c2),
            object_mass / 5.0 * (a2 + b2),
        );
        Self {
            pv: ParticleVector::new(name, mass),
            object_size,
            template: Vec::new(),
            semi_axes: Some(semi_axes),
            mesh,
            motions: Vec::new(),
            halo_motions: Vec::new(),
            halo_origin: Vec::new(),
            object_mass,
            inertia_body,
        }
    }

    /// Number of local objects.
    #[must_use]
    pub fn n_objects(&self) -> usize {
        self.motions.len()
    }

    /// Write the template particles of object `obj` at its current pose into
    /// the local particle set, with the rigid velocity field.
    pub fn project_object(&mut self, obj: usize) {
        let motion = self.motions[obj];
        let base = obj * self.object_size;
        for (k, &tmpl) in self.template.iter().enumerate() {
            let r = motion.q * tmpl;
            self.pv.local.positions[base + k] = motion.com + r;
            self.pv.local.velocities[base + k] = motion.point_velocity(r);
        }
    }

    /// Re-project every local object.
    pub fn project_all(&mut self) {
        for obj in 0..self.n_objects() {
            self.project_object(obj);
        }
    }
}

/// A vector of membranes, each an instance of the shared mesh.
#[derive(Debug)]
pub struct MembraneVector {
    /// The underlying particles: `n_objects * mesh.n_vertices()` vertices.
    pub pv: ParticleVector,
    /// The shared mesh topology and stress-free shape.
    pub mesh: Arc<Mesh>,
    /// Local object each halo copy originates from, with the applied shift.
    pub halo_origin: Vec<(usize, Vector3<Real>)>,
}

impl MembraneVector {
    /// Create an empty membrane vector.
    #[must_use]
    pub fn new(name: impl Into<String>, mass: Real, mesh: Arc<Mesh>) -> Self {
        Self {
            pv: ParticleVector::new(name, mass),
            mesh,
            halo_origin: Vec::new(),
        }
    }

    /// Particles per membrane.
    #[must_use]
    pub fn object_size(&self) -> usize {
        self.mesh.n_vertices()
    }

    /// Number of local membranes.
    #[must_use]
    pub fn n_objects(&self) -> usize {
        if self.object_size() == 0 {
            0
        } else {
            self.pv.local.len() / self.object_size()
        }
    }
}
