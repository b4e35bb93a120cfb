//! Discrete differential geometry on triangle meshes.
//!
//! Gradients of triangle area and of the signed dihedral deviation angle,
//! the two primitives every membrane energy term differentiates through.

use meso_types::{Real, Vector3};

/// Gradient of the area of triangle `(x0, x1, x2)` with respect to each
/// vertex. Returns the area as well.
#[must_use]
pub fn triangle_area_gradients(
    x0: Vector3<Real>,
    x1: Vector3<Real>,
    x2: Vector3<Real>,
) -> (Real, [Vector3<Real>; 3]) {
    let n = (x1 - x0).cross(&(x2 - x0));
    let nn = n.norm();
    let area = 0.5 * nn;
    if nn < 1e-12 {
        return (area, [Vector3::zeros(); 3]);
    }
    let n_hat = n / nn;
    let g0 = 0.5 * n_hat.cross(&(x2 - x1));
    let g1 = 0.5 * n_hat.cross(&(x0 - x2));
    let g2 = 0.5 * n_hat.cross(&(x1 - x0));
    (area, [g0, g1, g2])
}

/// Gradient of the signed volume contribution `x0 . (x1 x x2) / 6` of one
/// triangle of a closed mesh.
#[must_use]
pub fn triangle_volume_gradients(
    x0: Vector3<Real>,
    x1: Vector3<Real>,
    x2: Vector3<Real>,
) -> (Real, [Vector3<Real>; 3]) {
    let v = x0.dot(&x1.cross(&x2)) / 6.0;
    (
        v,
        [
            x1.cross(&x2) / 6.0,
            x2.cross(&x0) / 6.0,
            x0.cross(&x1) / 6.0,
        ],
    )
}

/// Signed dihedral deviation angle of the edge `(x0, x1)` shared by
/// triangles `(x0, x1, x2)` and `(x1, x0, x3)`, plus its gradient at the
/// four stencil vertices.
///
/// The angle is zero when the faces are coplanar and positive when the
/// opposite vertices fold *away* from the face normals, i.e. positive
/// everywhere on a convex outward-oriented mesh.
#[must_use]
pub fn dihedral_angle_gradients(
    x0: Vector3<Real>,
    x1: Vector3<Real>,
    x2: Vector3<Real>,
    x3: Vector3<Real>,
) -> (Real, [Vector3<Real>; 4]) {
    let e = x1 - x0;
    let e_len = e.norm();
    if e_len < 1e-12 {
        return (0.0, [Vector3::zeros(); 4]);
    }
    let e_hat = e / e_len;

    let na = e.cross(&(x2 - x0));
    let nb = (x3 - x1).cross(&e);
    let na2 = na.norm_squared();
    let nb2 = nb.norm_squared();
    if na2 < 1e-12 || nb2 < 1e-12 {
        return (0.0, [Vector3::zeros(); 4]);
    }

    let na_hat = na / na2.sqrt();
    let nb_hat = nb / nb2.sqrt();
    let psi = Real::atan2(na_hat.cross(&nb_hat).dot(&e_hat), na_hat.dot(&nb_hat));

    let ga = na / na2;
    let gb = nb / nb2;
    let za = (x2 - x0).dot(&e_hat);
    let zb = (x3 - x0).dot(&e_hat);

    let g2 = -e_len * ga;
    let g3 = -e_len * gb;
    let g1 = za * ga + zb * gb;
    let g0 = -(g1 + g2 + g3);

    (psi, [g0, g1, g2, g3])
}
