//! Analytic ellipsoid belonging checker.

use meso_types::{Real, Result, SimError, Vector3};

use super::{BelongingChecker, BelongingTag};
use crate::pvs::AnyVector;

/// Tags particles against the analytic surface of rigid ellipsoids.
#[derive(Debug)]
pub struct EllipsoidBelongingChecker {
    name: String,
}

impl EllipsoidBelongingChecker {
    /// Create an ellipsoid checker.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl BelongingChecker for EllipsoidBelongingChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag_particles(
        &self,
        ov: &AnyVector,
        positions: &[Vector3<Real>],
    ) -> Result<Vec<BelongingTag>> {
        let rov = ov.as_rigid().ok_or_else(|| {
            SimError::invalid_config("ellipsoid belonging checker needs a rigid ellipsoid vector")
        })?;
        let axes = rov.semi_axes.ok_or_else(|| {
            SimError::invalid_config("ellipsoid belonging checker needs ellipsoid semi-axes")
        })?;

        let inside_one = |p: Vector3<Real>| {
            rov.motions
                .iter()
                .chain(rov.halo_motions.iter())
                .any(|motion| {
                    let b = motion.q.inverse_transform_vector(&(p - motion.com));
                    let q = Vector3::new(b.x / axes.x, b.y / axes.y, b.z / axes.z);
                    q.norm_squared() < 1.0
                })
        };

        Ok(positions
            .iter()
            .map(|&p| {
                if inside_one(p) {
                    BelongingTag::Inside
                } else {
                    BelongingTag::Outside
                }
            })
            .collect())
    }
}
