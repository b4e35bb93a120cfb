//! Analytic wall shapes.

use meso_types::{Real, Vector3};

use super::SdfShape;

/// Half-space wall: solid on the side the normal points to, beyond the
/// given offset along the normal.
#[derive(Debug, Clone, Copy)]
pub struct PlaneWall {
    normal: Vector3<Real>,
    offset: Real,
}

impl PlaneWall {
    /// Create a plane wall with the solid side at `normal . x > offset`.
    #[must_use]
    pub fn new(normal: Vector3<Real>, offset: Real) -> Self {
        Self {
            normal: normal.normalize(),
            offset,
        }
    }
}

impl SdfShape for PlaneWall {
    fn sdf(&self, p: Vector3<Real>) -> Real {
        self.normal.dot(&p) - self.offset
    }

    fn grad(&self, _p: Vector3<Real>) -> Vector3<Real> {
        self.normal
    }
}

/// Spherical wall; `inside_is_solid` selects whether the solid region is
/// the ball or its complement.
#[derive(Debug, Clone, Copy)]
pub struct SphereWall {
    center: Vector3<Real>,
    radius: Real,
    inside_is_solid: bool,
}

impl SphereWall {
    /// Create a sphere wall.
    #[must_use]
    pub fn new(center: Vector3<Real>, radius: Real, inside_is_solid: bool) -> Self {
        Self {
            center,
            radius,
            inside_is_solid,
        }
    }
}

impl SdfShape for SphereWall {
    fn sdf(&self, p: Vector3<Real>) -> Real {
        let d = (p - self.center).norm() - self.radius;
        if self.inside_is_solid {
            -d
        } else {
            d
        }
    }

    fn grad(&self, p: Vector3<Real>) -> Vector3<Real> {
        let r = p - self.center;
        let g = r / r.norm().max(1e-12);
        if self.inside_is_solid {
            -g
        } else {
            g
        }
    }
}

/// Infinite cylinder along one coordinate axis.
#[derive(Debug, Clone, Copy)]
pub struct CylinderWall {
    center: Vector3<Real>,
    radius: Real,
    axis: usize,
    inside_is_solid: bool,
}

impl CylinderWall {
    /// Create a cylinder wall along the given axis (0 = x, 1 = y, 2 = z).
    #[must_use]
    pub fn new(center: Vector3<Real>, radius: Real, axis: usize, inside_is_solid: bool) -> Self {
        Self {
            center,
            radius,
            axis: axis % 3,
            inside_is_solid,
        }
    }

    fn radial(&self, p: Vector3<Real>) -> Vector3<Real> {
        let mut r = p - self.center;
        r[self.axis] = 0.0;
        r
    }
}

impl SdfShape for CylinderWall {
    fn sdf(&self, p: Vector3<Real>) -> Real {
        let d = self.radial(p).norm() - self.radius;
        if self.inside_is_solid {
            -d
        } else {
            d
        }
    }

    fn grad(&self, p: Vector3<Real>) -> Vector3<Real> {
        let r = self.radial(p);
        let g = r / r.norm().max(1e-12);
        if self.inside_is_solid {
            -g
        } else {
            g
        }
    }
}

/// Axis-aligned box wall; solid outside the box.
#[derive(Debug, Clone, Copy)]
pub struct BoxWall {
    lo: Vector3<Real>,
    hi: Vector3<Real>,
}

impl BoxWall {
    /// Create a box wall with fluid inside `[lo, hi]`.
    #[must_use]
    pub fn new(lo: Vector3<Real>, hi: Vector3<Real>) -> Self {
        Self { lo, hi }
    }
}

impl SdfShape for BoxWall {
    fn sdf(&self, p: Vector3<Real>) -> Real {
        // Distance to the box boundary, negative inside.
        let mut max_side = Real::MIN;
        for k in 0..3 {
            max_side = max_side.max(self.lo[k] - p[k]).max(p[k] - self.hi[k]);
        }
        max_side
    }
}

/// Union of several walls: solid wherever any member is solid.
pub struct SdfUnion {
    members: Vec<Box<dyn SdfShape>>,
}

impl SdfUnion {
    /// Create a union shape.
    #[must_use]
    pub fn new(members: Vec<Box<dyn SdfShape>>) -> Self {
        Self { members }
    }
}

impl SdfShape for SdfUnion {
    fn sdf(&self, p: Vector3<Real>) -> Real {
        self.members
            .iter()
            .map(|m| m.sdf(p))
            .fold(Real::MIN, Real::max)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane() {
        let w = PlaneWall::new(Vector3::new(0.0, 0.0, 2.0), 1.0);
        assert!(w.sdf(Vector3::new(0.0, 0.0, 2.0)) > 0.0);
        assert!(w.sdf(Vector3::new(0.0, 0.0, 0.0)) < 0.0);
        assert_relative_eq!(w.grad(Vector3::zeros()).norm(), 1.0);
    }

    #[test]
    fn test_sphere_orientation() {
        let solid_ball = SphereWall::new(Vector3::zeros(), 1.0, true);
        assert!(solid_ball.sdf(Vector3::zeros()) > 0.0);
        assert!(solid_ball.sdf(Vector3::new(2.0, 0.0, 0.0)) < 0.0);

        let cavity = SphereWall::new(Vector3::zeros(), 1.0, false);
        assert!(cavity.sdf(Vector3::zeros()) < 0.0);
        assert!(cavity.sdf(Vector3::new(2.0, 0.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_cylinder_axis() {
        let pipe = CylinderWall::new(Vector3::new(4.0, 4.0, 0.0), 2.0, 2, false);
        // On the axis: deep fluid.
        assert!(pipe.sdf(Vector3::new(4.0, 4.0, 100.0)) < 0.0);
        assert!(pipe.sdf(Vector3::new(7.0, 4.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_box_and_union() {
        let b = BoxWall::new(Vector3::zeros(), Vector3::new(2.0, 2.0, 2.0));
        assert!(b.sdf(Vector3::new(1.0, 1.0, 1.0)) < 0.0);
        assert!(b.sdf(Vector3::new(3.0, 1.0, 1.0)) > 0.0);

        let union = SdfUnion::new(vec![
            Box::new(PlaneWall::new(Vector3::new(0.0, 0.0, 1.0), 1.0)),
            Box::new(PlaneWall::new(Vector3::new(0.0, 0.0, -1.0), 1.0)),
        ]);
        // Slab of fluid between z = -1 and z = 1.
        assert!(union.sdf(Vector3::zeros()) < 0.0);
        assert!(union.sdf(Vector3::new(0.0, 0.0, 1.5)) > 0.0);
        assert!(union.sdf(Vector3::new(0.0, 0.0, -1.5)) > 0.0);
    }
}
