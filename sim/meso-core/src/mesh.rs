//! Triangle meshes for membranes and rigid object surfaces.
//!
//! A [`Mesh`] stores the reference (stress-free) vertex positions, the
//! triangle faces, and the derived connectivity the membrane forces need:
//! unique edges with their two adjacent triangles and opposite vertices
//! (for dihedral bending), plus reference areas and volume.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use meso_types::{Real, Result, SimError, Vector3};

/// A unique mesh edge together with its dihedral stencil.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    /// First endpoint.
    pub v0: u32,
    /// Second endpoint.
    pub v1: u32,
    /// Vertex opposite the edge in the first adjacent triangle.
    pub opp0: u32,
    /// Vertex opposite the edge in the second adjacent triangle, if closed.
    pub opp1: Option<u32>,
}

/// Immutable triangle mesh shared between all instances of a membrane or
/// rigid object vector.
#[derive(Debug)]
pub struct Mesh {
    vertices: Vec<Vector3<Real>>,
    faces: Vec<[u32; 3]>,
    edges: Vec<Edge>,
}

impl Mesh {
    /// Build a mesh from vertices and faces, deriving edge connectivity.
    ///
    /// # Errors
    ///
    /// Fails if a face references a missing vertex or an edge has more than
    /// two adjacent triangles.
    pub fn new(vertices: Vec<Vector3<Real>>, faces: Vec<[u32; 3]>) -> Result<Self> {
        let nv = vertices.len() as u32;
        for f in &faces {
            if f.iter().any(|&v| v >= nv) {
                return Err(SimError::invalid_config(format!(
                    "mesh face {f:?} references a vertex >= {nv}"
                )));
            }
        }

        let mut edge_map: hashbrown::HashMap<(u32, u32), Edge> = hashbrown::HashMap::new();
        for f in &faces {
            for k in 0..3 {
                let a = f[k];
                let b = f[(k + 1) % 3];
                let opp = f[(k + 2) % 3];
                let key = (a.min(b), a.max(b));
                match edge_map.get_mut(&key) {
                    None => {
                        edge_map.insert(
                            key,
                            Edge {
                                v0: key.0,
                                v1: key.1,
                                opp0: opp,
                                opp1: None,
                            },
                        );
                    }
                    Some(edge) if edge.opp1.is_none() => edge.opp1 = Some(opp),
                    Some(_) => {
                        return Err(SimError::invalid_config(format!(
                            "mesh edge ({a}, {b}) has more than two adjacent triangles"
                        )))
                    }
                }
            }
        }
        let mut edges: Vec<Edge> = edge_map.into_values().collect();
        edges.sort_by_key(|e| (e.v0, e.v1));

        Ok(Self {
            vertices,
            faces,
            edges,
        })
    }

    /// Load a mesh from an OFF file.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or a malformed file.
    pub fn from_off(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).map_err(|e| SimError::io(path.display().to_string(), e))?;
        Self::parse_off(&text, &path.display().to_string())
    }

    fn parse_off(text: &str, path: &str) -> Result<Self> {
        let mut tokens = text
            .lines()
            .map(|l| l.split('#').next().unwrap_or(""))
            .flat_map(str::split_whitespace);

        let magic = tokens
            .next()
            .ok_or_else(|| SimError::malformed(path, "empty file"))?;
        if magic != "OFF" {
            return Err(SimError::malformed(path, "missing OFF header"));
        }

        let mut read_usize = |what: &str| -> Result<usize> {
            tokens
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| SimError::malformed(path, format!("bad {what}")))
        };
        let nv = read_usize("vertex count")?;
        let nf = read_usize("face count")?;
        let _ne = read_usize("edge count")?;

        let mut rest = text
            .lines()
            .map(|l| l.split('#').next().unwrap_or(""))
            .flat_map(str::split_whitespace)
            .skip(4);

        let mut vertices = Vec::with_capacity(nv);
        for _ in 0..nv {
            let mut coord = [0.0 as Real; 3];
            for c in &mut coord {
                *c = rest
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| SimError::malformed(path, "bad vertex coordinate"))?;
            }
            vertices.push(Vector3::new(coord[0], coord[1], coord[2]));
        }

        let mut faces = Vec::with_capacity(nf);
        for _ in 0..nf {
            let arity: usize = rest
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| SimError::malformed(path, "bad face arity"))?;
            if arity != 3 {
                return Err(SimError::malformed(path, "only triangle faces supported"));
            }
            let mut face = [0u32; 3];
            for v in &mut face {
                *v = rest
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| SimError::malformed(path, "bad face index"))?;
            }
            faces.push(face);
        }

        Self::new(vertices, faces)
    }

    /// Unit icosphere subdivided `subdivisions` times and scaled to `radius`.
    ///
    /// Handy for tests and for rigid bodies whose surface was not supplied
    /// as a file.
    #[must_use]
    pub fn icosphere(subdivisions: u32, radius: Real) -> Arc<Self> {
        let phi = (1.0 + 5.0_f64.sqrt() as Real) / 2.0;
        let mut vertices: Vec<Vector3<Real>> = [
            (-1.0, phi, 0.0),
            (1.0, phi, 0.0),
            (-1.0, -phi, 0.0),
            (1.0, -phi, 0.0),
            (0.0, -1.0, phi),
            (0.0, 1.0, phi),
            (0.0, -1.0, -phi),
            (0.0, 1.0, -phi),
            (phi, 0.0, -1.0),
            (phi, 0.0, 1.0),
            (-phi, 0.0, -1.0),
            (-phi, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| Vector3::new(x, y, z).normalize())
        .collect();

        let mut faces: Vec<[u32; 3]> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoint: hashbrown::HashMap<(u32, u32), u32> = hashbrown::HashMap::new();
            let mut next = Vec::with_capacity(faces.len() * 4);
            for f in &faces {
                let mut mid = [0u32; 3];
                for k in 0..3 {
                    let a = f[k];
                    let b = f[(k + 1) % 3];
                    let key = (a.min(b), a.max(b));
                    mid[k] = *midpoint.entry(key).or_insert_with(|| {
                        let m = (vertices[a as usize] + vertices[b as usize]).normalize();
                        vertices.push(m);
                        (vertices.len() - 1) as u32
                    });
                }
                next.push([f[0], mid[0], mid[2]]);
                next.push([f[1], mid[1], mid[0]]);
                next.push([f[2], mid[2], mid[1]]);
                next.push([mid[0], mid[1], mid[2]]);
            }
            faces = next;
        }

        for v in &mut vertices {
            *v *= radius;
        }

        #[allow(clippy::expect_used)]
        Arc::new(Self::new(vertices, faces).expect("icosphere construction is well formed"))
    }

    /// Reference vertex positions.
    #[must_use]
    pub fn vertices(&self) -> &[Vector3<Real>] {
        &self.vertices
    }

    /// Triangle faces.
    #[must_use]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Unique edges with dihedral stencils.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of vertices (= particles per membrane instance).
    #[must_use]
    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    #[must_use]
    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    /// Area of one triangle given arbitrary vertex positions.
    #[must_use]
    pub fn triangle_area(r0: Vector3<Real>, r1: Vector3<Real>, r2: Vector3<Real>) -> Real {
        0.5 * (r1 - r0).cross(&(r2 - r0)).norm()
    }

    /// Total surface area for the given vertex positions.
    #[must_use]
    pub fn total_area(&self, positions: &[Vector3<Real>]) -> Real {
        self.faces
            .iter()
            .map(|f| {
                Self::triangle_area(
                    positions[f[0] as usize],
                    positions[f[1] as usize],
                    positions[f[2] as usize],
                )
            })
            .sum()
    }

    /// Signed enclosed volume for the given vertex positions (closed mesh,
    /// outward orientation gives a positive value).
    #[must_use]
    pub fn total_volume(&self, positions: &[Vector3<Real>]) -> Real {
        self.faces
            .iter()
            .map(|f| {
                let r0 = positions[f[0] as usize];
                let r1 = positions[f[1] as usize];
                let r2 = positions[f[2] as usize];
                r0.dot(&r1.cross(&r2)) / 6.0
            })
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_off() {
        let text = "OFF\n4 4 6\n0 0 0\n1 0 0\n0 1 0\n0 0 1\n\
                    3 0 2 1\n3 0 1 3\n3 0 3 2\n3 1 2 3\n";
        let mesh = Mesh::parse_off(text, "tetra.off").unwrap();
        assert_eq!(mesh.n_vertices(), 4);
        assert_eq!(mesh.n_faces(), 4);
        assert_eq!(mesh.edges().len(), 6);
        // Every edge of a closed mesh has two opposite vertices.
        assert!(mesh.edges().iter().all(|e| e.opp1.is_some()));
    }

    #[test]
    fn test_parse_off_rejects_garbage() {
        assert!(Mesh::parse_off("PLY\n", "x.off").is_err());
        assert!(Mesh::parse_off("OFF\n1 1 0\n0 0 0\n3 0 0 5\n", "x.off").is_err());
    }

    #[test]
    fn test_icosphere_metrics() {
        let mesh = Mesh::icosphere(2, 1.0);
        let area = mesh.total_area(mesh.vertices());
        let volume = mesh.total_volume(mesh.vertices());
        // Inscribed polyhedron: slightly below the sphere values.
        assert!(area < 4.0 * std::f32::consts::PI);
        assert!(area > 0.95 * 4.0 * std::f32::consts::PI);
        assert!(volume < 4.0 / 3.0 * std::f32::consts::PI);
        assert!(volume > 0.9 * 4.0 / 3.0 * std::f32::consts::PI);
    }

    #[test]
    fn test_icosphere_closed() {
        let mesh = Mesh::icosphere(1, 2.0);
        // Euler characteristic of a sphere: V - E + F = 2.
        let v = mesh.n_vertices() as i64;
        let e = mesh.edges().len() as i64;
        let f = mesh.n_faces() as i64;
        assert_eq!(v - e + f, 2);
        assert!(mesh.edges().iter().all(|e| e.opp1.is_some()));
    }

    #[test]
    fn test_triangle_area() {
        let a = Mesh::triangle_area(
            Vector3::zeros(),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        );
        assert_relative_eq!(a, 0.5);
    }
}
