//! Mesh belonging checker: ray-parity inside test against object surfaces.

use meso_types::{Real, Result, SimError, Vector3};

use super::{BelongingChecker, BelongingTag};
use crate::mesh::Mesh;
use crate::pvs::AnyVector;

/// Tags particles against closed triangle-mesh surfaces by counting ray
/// crossings along +x.
#[derive(Debug)]
pub struct MeshBelongingChecker {
    name: String,
}

impl MeshBelongingChecker {
    /// Create a mesh checker.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Möller-Trumbore with a +x ray; returns true on a forward hit.
fn ray_x_hits_triangle(
    origin: Vector3<Real>,
    v0: Vector3<Real>,
    v1: Vector3<Real>,
    v2: Vector3<Real>,
) -> bool {
    let dir = Vector3::new(1.0 as Real, 0.0, 0.0);
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let p = dir.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < 1e-10 {
        return false;
    }
    let inv_det = 1.0 / det;
    let s = origin - v0;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let q = s.cross(&e1);
    let v = dir.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    e2.dot(&q) * inv_det > 0.0
}

fn inside_object(p: Vector3<Real>, mesh: &Mesh, vertices: &[Vector3<Real>]) -> bool {
    let mut crossings = 0usize;
    for f in mesh.faces() {
        if ray_x_hits_triangle(
            p,
            vertices[f[0] as usize],
            vertices[f[1] as usize],
            vertices[f[2] as usize],
        ) {
            crossings += 1;
        }
    }
    crossings % 2 == 1
}

impl BelongingChecker for MeshBelongingChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag_particles(
        &self,
        ov: &AnyVector,
        positions: &[Vector3<Real>],
    ) -> Result<Vec<BelongingTag>> {
        let (mesh, pv) = match ov {
            AnyVector::Membrane(mv) => (mv.mesh.clone(), &mv.pv),
            AnyVector::Rigid(rov) => {
                let mesh = rov.mesh.clone().ok_or_else(|| {
                    SimError::invalid_config("mesh belonging checker needs an object surface mesh")
                })?;
                (mesh, &rov.pv)
            }
            AnyVector::Plain(_) => {
                return Err(SimError::invalid_config(
                    "mesh belonging checker needs an object vector",
                ))
            }
        };

        let nv = mesh.n_vertices();
        let mut object_slices: Vec<&[Vector3<Real>]> = Vec::new();
        for set in [&pv.local, &pv.halo] {
            let n_objects = if nv == 0 { 0 } else { set.len() / nv };
            for obj in 0..n_objects {
                object_slices.push(&set.positions[obj * nv..(obj + 1) * nv]);
            }
        }

        Ok(positions
            .iter()
            .map(|&p| {
                let inside = object_slices
                    .iter()
                    .any(|vertices| inside_object(p, &mesh, vertices));
                if inside {
                    BelongingTag::Inside
                } else {
                    BelongingTag::Outside
                }
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pvs::MembraneVector;
    use meso_types::ParticleId;

    #[test]
    fn test_inside_icosphere() {
        let mesh = Mesh::icosphere(2, 1.0);
        assert!(inside_object(Vector3::zeros(), &mesh, mesh.vertices()));
        assert!(!inside_object(
            Vector3::new(2.0, 0.0, 0.0),
            &mesh,
            mesh.vertices()
        ));
        assert!(inside_object(
            Vector3::new(0.5, 0.3, 0.1),
            &mesh,
            mesh.vertices()
        ));
    }

    #[test]
    fn test_checker_over_membrane_vector() {
        let mesh = Mesh::icosphere(1, 1.0);
        let mut mv = MembraneVector::new("rbc", 1.0, mesh.clone());
        let offset = Vector3::new(3.0, 0.0, 0.0);
        for (i, v) in mesh.vertices().iter().enumerate() {
            mv.pv
                .local
                .push(v + offset, Vector3::zeros(), ParticleId::new(i as u64));
        }
        let ov = AnyVector::Membrane(mv);

        let checker = MeshBelongingChecker::new("mesh_checker");
        let tags = checker
            .tag_particles(&ov, &[offset, Vector3::zeros()])
            .unwrap();
        assert_eq!(tags[0], BelongingTag::Inside);
        assert_eq!(tags[1], BelongingTag::Outside);
    }
}
