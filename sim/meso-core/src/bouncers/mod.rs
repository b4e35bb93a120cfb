//! Bounce-back of solvent particles from object surfaces.
//!
//! Bouncers run after integration: particles that ended the step inside an
//! object (or across its surface) are moved back to the crossing point of
//! their trajectory and reflected off the locally moving surface. The
//! momentum change is fed back to the object, as a wrench on rigid bodies
//! or as vertex forces on membranes.

mod ellipsoid;
mod mesh;

pub use ellipsoid::BounceFromEllipsoid;
pub use mesh::BounceFromMesh;

use meso_types::{Result, SimulationState};

use crate::celllist::CellList;
use crate::pvs::AnyVector;

/// A registered bouncer.
pub trait Bouncer {
    /// Unique name.
    fn name(&self) -> &str;

    /// Channels of the object vector that must travel with its halo
    /// exchange for the bounce to work on halo objects.
    fn channels_to_exchange(&self) -> Vec<String> {
        vec![crate::pvs::channel_names::OLD_POSITIONS.to_owned()]
    }

    /// Bounce the particles of `pv` off the objects of `ov`.
    ///
    /// `halo` selects the halo copies of the objects; the bounced particles
    /// are always local. `cl` is the bounced vector's cell list, used for
    /// candidate lookup.
    ///
    /// # Errors
    ///
    /// Mismatched vector kinds or missing prerequisite channels.
    fn bounce(
        &mut self,
        state: &SimulationState,
        ov: &mut AnyVector,
        pv: &mut AnyVector,
        cl: &CellList,
        halo: bool,
    ) -> Result<()>;
}

/// Collect the particle indices of `cl`'s cells overlapping a bounding box
/// (local-frame corners `lo`/`hi`), mapped back to particle-vector order.
pub(crate) fn candidates_in_aabb(
    cl: &CellList,
    lo: meso_types::Vector3<f32>,
    hi: meso_types::Vector3<f32>,
) -> Vec<usize> {
    let c_lo = cl.grid.cell_along_axes_clamped(lo);
    let c_hi = cl.grid.cell_along_axes_clamped(hi);
    let mut out = Vec::new();
    for cz in c_lo[2]..=c_hi[2] {
        for cy in c_lo[1]..=c_hi[1] {
            for cx in c_lo[0]..=c_hi[0] {
                let cid = cl.grid.encode(cx, cy, cz);
                for k in cl.cell_range(cid) {
                    out.push(cl.order[k]);
                }
            }
        }
    }
    out
}
