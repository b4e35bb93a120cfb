//! Interactions between particle vectors.
//!
//! Interactions come in two stages:
//!
//! - *Intermediate* interactions produce quantities that later force passes
//!   consume, e.g. particle number densities for MDPD and SDPD;
//! - *Final* interactions produce forces (and possibly stresses).
//!
//! The [`InteractionManager`] keeps the bookkeeping of which channel lives
//! on which cell list, and when it must be cleared, gathered or accumulated.

pub mod factory;
pub mod manager;
pub mod membrane;
pub mod pairwise;

pub use manager::{Binding, InteractionManager};

use meso_types::{Real, Result, SimulationState};

use crate::celllist::CellList;
use crate::pvs::AnyVector;

/// When an interaction's output channel carries meaningful data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivePredicate {
    /// Always active.
    Always,
    /// Active once the simulation time passes the given value.
    After(Real),
}

impl ActivePredicate {
    /// Evaluate the predicate at simulation time `t`.
    #[must_use]
    pub fn is_active(&self, t: Real) -> bool {
        match *self {
            Self::Always => true,
            Self::After(t0) => t >= t0,
        }
    }
}

/// A channel an interaction reads or writes, with its activity window.
#[derive(Debug, Clone)]
pub struct InteractionChannel {
    /// Channel name.
    pub name: String,
    /// When the channel is live.
    pub active: ActivePredicate,
}

impl InteractionChannel {
    /// An always-active channel.
    #[must_use]
    pub fn always(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            active: ActivePredicate::Always,
        }
    }
}

/// Stage of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionStage {
    /// Produces inputs of final interactions (densities).
    Intermediate,
    /// Produces forces.
    Final,
}

/// The particle vectors and cell lists one execution call works on.
///
/// `other` is `None` for a self-interaction (`pv2 == pv1`), in which case
/// `cl1` is the shared cell list.
pub struct ExecTarget<'a> {
    /// First particle vector.
    pub pv1: &'a mut AnyVector,
    /// Cell list of the first particle vector.
    pub cl1: &'a mut CellList,
    /// Second particle vector and its cell list, when distinct.
    pub other: Option<(&'a mut AnyVector, &'a mut CellList)>,
}

/// A registered interaction.
pub trait Interaction {
    /// Unique name.
    fn name(&self) -> &str;

    /// Cutoff radius; determines the cell lists built for the bound
    /// particle vectors.
    fn rc(&self) -> Real;

    /// Stage of this interaction.
    fn stage(&self) -> InteractionStage {
        InteractionStage::Final
    }

    /// Channels this interaction needs as input (produced by an
    /// intermediate interaction earlier in the step).
    fn input_channels(&self) -> Vec<InteractionChannel> {
        Vec::new()
    }

    /// Channels this interaction writes.
    fn output_channels(&self) -> Vec<InteractionChannel>;

    /// Per-step setup (e.g. drawing the random seed of the step).
    fn setup(&mut self, _state: &SimulationState) {}

    /// Compute the interaction among local particles.
    ///
    /// # Errors
    ///
    /// Implementations report missing channels or mismatched particle
    /// vector kinds.
    fn exec_local(&mut self, state: &SimulationState, target: ExecTarget<'_>) -> Result<()>;

    /// Compute the interaction between halo particles and local particles.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Interaction::exec_local`].
    fn exec_halo(&mut self, state: &SimulationState, target: ExecTarget<'_>) -> Result<()>;
}

/// Disjoint mutable references into one slice.
///
/// # Panics
///
/// Panics if `i == j` or either index is out of bounds; callers guarantee
/// distinctness.
pub(crate) fn pair_mut<T>(slice: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    assert_ne!(i, j);
    if i < j {
        let (lo, hi) = slice.split_at_mut(j);
        (&mut lo[i], &mut hi[0])
    } else {
        let (lo, hi) = slice.split_at_mut(i);
        (&mut hi[0], &mut lo[j])
    }
}
