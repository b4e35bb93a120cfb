//! Object belonging: tagging particles as inside or outside the objects of
//! an object vector, and splitting particle vectors accordingly.

mod ellipsoid;
mod mesh;

pub use ellipsoid::EllipsoidBelongingChecker;
pub use mesh::MeshBelongingChecker;

use meso_types::{Real, Result, Vector3};

use crate::interactions::pair_mut;
use crate::pvs::AnyVector;

/// Side of the object surface a particle is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BelongingTag {
    /// Inside one of the objects.
    Inside,
    /// In the bulk.
    Outside,
}

/// A registered belonging checker, bound to one object vector.
pub trait BelongingChecker {
    /// Unique name.
    fn name(&self) -> &str;

    /// Channels of the object vector that must travel with its halo
    /// exchange for halo-side tagging.
    fn channels_to_exchange(&self) -> Vec<String> {
        Vec::new()
    }

    /// Tag each position against the objects (local and halo) of `ov`.
    ///
    /// # Errors
    ///
    /// Mismatched object vector kind.
    fn tag_particles(&self, ov: &AnyVector, positions: &[Vector3<Real>])
        -> Result<Vec<BelongingTag>>;
}

/// Split `src` by belonging to the checker's objects: particles tagged
/// `Inside` end up in `inside`, the rest in `outside`; `None` drops that
/// side. One of the destinations is `src` itself.
///
/// # Errors
///
/// Propagates tagging errors.
pub fn split_by_belonging(
    checker: &dyn BelongingChecker,
    pvs: &mut [AnyVector],
    ov_idx: usize,
    src_idx: usize,
    inside_idx: Option<usize>,
    outside_idx: Option<usize>,
) -> Result<(usize, usize)> {
    let tags = checker.tag_particles(&pvs[ov_idx], &pvs[src_idx].pv().local.positions)?;

    let mut n_inside = 0usize;
    let mut n_outside = 0usize;

    // Move the particles that do not stay in the source.
    let src_stays_inside = inside_idx == Some(src_idx);
    let mut moved: Vec<(Option<usize>, usize)> = Vec::new();
    for (i, tag) in tags.iter().enumerate() {
        match tag {
            BelongingTag::Inside => {
                n_inside += 1;
                if !src_stays_inside {
                    moved.push((inside_idx, i));
                }
            }
            BelongingTag::Outside => {
                n_outside += 1;
                if src_stays_inside {
                    moved.push((outside_idx, i));
                }
            }
        }
    }

    for &(dst, i) in &moved {
        if let Some(dst_idx) = dst {
            if dst_idx != src_idx {
                let (src, dst) = pair_mut(pvs, src_idx, dst_idx);
                let set = &src.pv().local;
                let (p, v, id) = (set.positions[i], set.velocities[i], set.ids[i]);
                dst.pv_mut().local.push(p, v, id);
            }
        }
        pvs[src_idx].pv_mut().local.mark(i);
    }
    pvs[src_idx].pv_mut().local.compact_marked();

    Ok((n_inside, n_outside))
}
