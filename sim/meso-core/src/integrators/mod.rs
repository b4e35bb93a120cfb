//! Integrators advancing particle vectors through time.
//!
//! Every scheme has two hooks mirroring the two halves of a step; the
//! fused velocity-Verlet family only uses `stage2`, which runs after the
//! forces of the step are accumulated.
//!
//! Implemented schemes:
//!
//! - [`VelocityVerlet`] with a pluggable extra forcing term (none, constant
//!   force, periodic Poiseuille),
//! - prescribed motions ([`Translate`], [`Oscillate`], [`Rotate`]),
//! - [`RigidVelocityVerlet`] for rigid object vectors,
//! - [`SubStepMembrane`] advancing membranes with frozen slow forces.

mod prescribed;
mod rigid_vv;
mod sub_step;
mod vv;

pub use prescribed::{Oscillate, Rotate, Translate};
pub use rigid_vv::RigidVelocityVerlet;
pub use sub_step::SubStepMembrane;
pub use vv::{Forcing, VelocityVerlet};

use meso_types::{DomainInfo, Result, SimulationState};

use crate::pvs::AnyVector;

/// An integrator bound to particle vectors via `set_integrator`.
pub trait Integrator {
    /// Unique name.
    fn name(&self) -> &str;

    /// Create the channels this integrator maintains on the vector.
    fn set_prerequisites(&self, _pv: &mut AnyVector) {}

    /// Pre-force half step (unused by the fused schemes).
    fn stage1(&mut self, _state: &SimulationState, _domain: &DomainInfo, _pv: &mut AnyVector) {}

    /// Post-force update of velocities and positions.
    ///
    /// # Errors
    ///
    /// Reports mismatched vector kinds (e.g. a rigid integrator applied to
    /// loose particles).
    fn stage2(
        &mut self,
        state: &SimulationState,
        domain: &DomainInfo,
        pv: &mut AnyVector,
    ) -> Result<()>;
}

/// Copy current positions into the `old_positions` channel, creating it on
/// first use. Bounce-back resolvers consume these.
pub(crate) fn save_old_positions(set: &mut crate::pvs::ParticleSet) {
    use crate::pvs::{channel_names, Persistence};
    let n = set.len();
    set.channels
        .require_vector(channel_names::OLD_POSITIONS, n, Persistence::Persistent);
    if let Some(old) = set.channels.vector_mut(channel_names::OLD_POSITIONS) {
        old.resize(n, meso_types::Vector3::zeros());
        old.copy_from_slice(&set.positions);
    }
}
