//! Shared simulation state.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Real;

/// State of the simulation shared by all simulation objects: the current
/// time, the step counter and the timestep.
///
/// Handlers never advance this themselves; the coordinator owns the clock.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationState {
    /// Current simulation time.
    pub t: Real,
    /// Current step index.
    pub step: i64,
    /// Timestep.
    pub dt: Real,
}

impl SimulationState {
    /// Create a fresh state at `t = 0`, `step = 0`.
    #[must_use]
    pub fn new(dt: Real) -> Self {
        Self { t: 0.0, step: 0, dt }
    }

    /// Advance the clock by one timestep.
    pub fn advance(&mut self) {
        self.step += 1;
        self.t += self.dt;
    }

    /// Reset time and step, keeping the timestep.
    pub fn reinit_time(&mut self) {
        self.t = 0.0;
        self.step = 0;
    }
}
