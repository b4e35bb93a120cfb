//! Signed-distance-function walls.
//!
//! A wall is a signed distance field over global coordinates with the
//! simulation interior at negative values. Walls remove the particles
//! frozen inside them at start-up, bounce attached particle vectors every
//! step, and can periodically count escapees.

mod freeze;
mod shapes;

pub use freeze::{compute_volume_inside_walls, dump_walls_sdf, freeze_particles_near_walls};
pub use shapes::{BoxWall, CylinderWall, PlaneWall, SdfUnion, SphereWall};

use meso_types::{DomainInfo, Real, Vector3};
use tracing::warn;

use crate::pvs::{channel_names, AnyVector, ParticleSet};

/// A signed distance field in global coordinates; negative inside the
/// simulation region.
pub trait SdfShape: Send + Sync {
    /// Signed distance (negative = fluid side).
    fn sdf(&self, p: Vector3<Real>) -> Real;

    /// Gradient of the field; the default is a central finite difference,
    /// shapes override with the analytic form where available.
    fn grad(&self, p: Vector3<Real>) -> Vector3<Real> {
        let h = 1e-3;
        let mut g = Vector3::zeros();
        for k in 0..3 {
            let mut hi = p;
            let mut lo = p;
            hi[k] += h;
            lo[k] -= h;
            g[k] = (self.sdf(hi) - self.sdf(lo)) / (2.0 * h);
        }
        g
    }
}

/// A registered wall: a shape plus the vectors bounced off it.
pub struct Wall {
    /// Unique name.
    pub name: String,
    shape: Box<dyn SdfShape>,
    /// Indices of attached (bounced) particle vectors.
    pub attached: Vec<usize>,
}

impl Wall {
    /// Create a wall around a shape.
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Box<dyn SdfShape>) -> Self {
        Self {
            name: name.into(),
            shape,
            attached: Vec::new(),
        }
    }

    /// The wall's distance field.
    #[must_use]
    pub fn shape(&self) -> &dyn SdfShape {
        self.shape.as_ref()
    }

    /// Attach a particle vector for bouncing.
    pub fn attach(&mut self, pv_idx: usize) {
        if !self.attached.contains(&pv_idx) {
            self.attached.push(pv_idx);
        }
    }

    /// Mark every particle strictly inside the wall (`sdf > 0`) as dead and
    /// compact the set. Returns the number removed.
    pub fn remove_inner(&self, set: &mut ParticleSet, domain: &DomainInfo) -> usize {
        for i in 0..set.len() {
            let global = domain.local_to_global(set.positions[i]);
            if self.shape.sdf(global) > 0.0 {
                set.mark(i);
            }
        }
        set.compact_marked()
    }

    /// Bounce the particles of one attached vector: a particle that ended
    /// the step on the wall side is reflected about the surface and its
    /// velocity reversed (no-slip bounce-back).
    pub fn bounce(&self, pv: &mut AnyVector, domain: &DomainInfo) {
        let set = &mut pv.pv_mut().local;
        let has_old = set.channels.contains(channel_names::OLD_POSITIONS);
        for i in 0..set.len() {
            let global = domain.local_to_global(set.positions[i]);
            let phi = self.shape.sdf(global);
            if phi <= 0.0 {
                continue;
            }
            let n = self.shape.grad(global);
            let n_hat = n / n.norm().max(1e-12);
            // Mirror across the surface and reverse the velocity.
            set.positions[i] -= n_hat * (2.0 * phi);
            set.velocities[i] = -set.velocities[i];
            if has_old {
                if let Some(old) = set.channels.vector_mut(channel_names::OLD_POSITIONS) {
                    old[i] = set.positions[i];
                }
            }
        }
    }

    /// Count particles that ended up inside the wall and log a warning if
    /// any are found.
    #[must_use]
    pub fn check(&self, pv: &AnyVector, domain: &DomainInfo) -> usize {
        let set = &pv.pv().local;
        let mut inside = 0usize;
        for i in 0..set.len() {
            let global = domain.local_to_global(set.positions[i]);
            if self.shape.sdf(global) > 0.0 {
                inside += 1;
            }
        }
        if inside > 0 {
            warn!(
                wall = %self.name,
                pv = %pv.name(),
                count = inside,
                "particles escaped through the wall"
            );
        }
        inside
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pvs::ParticleVector;
    use meso_types::ParticleId;

    fn test_pv(positions: &[[Real; 3]]) -> AnyVector {
        let mut pv = ParticleVector::new("pv", 1.0);
        for (i, p) in positions.iter().enumerate() {
            pv.local.push(
                Vector3::new(p[0], p[1], p[2]),
                Vector3::new(0.0, 0.0, 1.0),
                ParticleId::new(i as u64),
            );
        }
        AnyVector::Plain(pv)
    }

    #[test]
    fn test_remove_inner() {
        // Wall above z = 6 (global); local frame of an 8^3 box is centered
        // at (4,4,4).
        let wall = Wall::new("top", Box::new(PlaneWall::new(Vector3::new(0.0, 0.0, 1.0), 6.0)));
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        let mut pv = test_pv(&[[0.0, 0.0, 0.0], [0.0, 0.0, 3.0]]);
        let removed = wall.remove_inner(&mut pv.pv_mut().local, &domain);
        assert_eq!(removed, 1);
        assert_eq!(pv.pv().local.len(), 1);
    }

    #[test]
    fn test_bounce_reflects() {
        let wall = Wall::new("top", Box::new(PlaneWall::new(Vector3::new(0.0, 0.0, 1.0), 6.0)));
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        // Local z = 2.5 is global z = 6.5, i.e. 0.5 beyond the wall.
        let mut pv = test_pv(&[[0.0, 0.0, 2.5]]);
        wall.bounce(&mut pv, &domain);
        let p = pv.pv().local.positions[0];
        assert!((p.z - 1.5).abs() < 1e-5, "mirrored to 0.5 below, got {p:?}");
        assert_eq!(pv.pv().local.velocities[0].z, -1.0);
        assert_eq!(wall.check(&pv, &domain), 0);
    }
}
