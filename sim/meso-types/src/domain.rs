//! Periodic domain geometry and the local subdomain frame.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Real;

/// Geometry of the periodic global domain and of the subdomain owned by the
/// current rank.
///
/// The global box is `[0, global_size)` per axis with periodic boundaries.
/// The local frame is centered on the subdomain: local coordinates span
/// `[-local_size/2, local_size/2)`. Particle storage always holds local
/// coordinates; checkpoints and dumps use global coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DomainInfo {
    /// Edge lengths of the global domain.
    pub global_size: Vector3<Real>,
    /// Edge lengths of the local subdomain.
    pub local_size: Vector3<Real>,
    /// Global coordinate of the lower corner of the local subdomain.
    pub global_start: Vector3<Real>,
}

impl DomainInfo {
    /// Domain of a single-rank run: the local subdomain is the whole box.
    #[must_use]
    pub fn single_rank(global_size: Vector3<Real>) -> Self {
        Self {
            global_size,
            local_size: global_size,
            global_start: Vector3::zeros(),
        }
    }

    /// Subdomain of rank `coords` in a `nranks` cartesian grid.
    ///
    /// The global box is split into equal chunks, one per rank.
    #[must_use]
    pub fn decomposed(global_size: Vector3<Real>, nranks: [usize; 3], coords: [usize; 3]) -> Self {
        let local_size = Vector3::new(
            global_size.x / nranks[0] as Real,
            global_size.y / nranks[1] as Real,
            global_size.z / nranks[2] as Real,
        );
        let global_start = Vector3::new(
            local_size.x * coords[0] as Real,
            local_size.y * coords[1] as Real,
            local_size.z * coords[2] as Real,
        );
        Self {
            global_size,
            local_size,
            global_start,
        }
    }

    /// Center of the local subdomain in global coordinates.
    #[must_use]
    pub fn local_center_global(&self) -> Vector3<Real> {
        self.global_start + 0.5 * self.local_size
    }

    /// Convert a global position to the centered local frame.
    #[must_use]
    pub fn global_to_local(&self, x: Vector3<Real>) -> Vector3<Real> {
        x - self.local_center_global()
    }

    /// Convert a local position to global coordinates (not wrapped).
    #[must_use]
    pub fn local_to_global(&self, x: Vector3<Real>) -> Vector3<Real> {
        x + self.local_center_global()
    }

    /// Wrap a global position into `[0, global_size)` per axis.
    #[must_use]
    pub fn wrap_global(&self, mut x: Vector3<Real>) -> Vector3<Real> {
        for k in 0..3 {
            let l = self.global_size[k];
            x[k] -= l * (x[k] / l).floor();
        }
        x
    }

    /// True if a local position lies inside the local subdomain.
    #[must_use]
    pub fn is_inside_local(&self, x: Vector3<Real>) -> bool {
        (0..3).all(|k| x[k] >= -0.5 * self.local_size[k] && x[k] < 0.5 * self.local_size[k])
    }

    /// Volume of the local subdomain.
    #[must_use]
    pub fn local_volume(&self) -> f64 {
        f64::from(self.local_size.x) * f64::from(self.local_size.y) * f64::from(self.local_size.z)
    }

    /// Volume of the global domain.
    #[must_use]
    pub fn global_volume(&self) -> f64 {
        f64::from(self.global_size.x)
            * f64::from(self.global_size.y)
            * f64::from(self.global_size.z)
    }
}
