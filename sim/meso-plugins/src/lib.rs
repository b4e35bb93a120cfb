//! Plugins for the mesodyn engine.
//!
//! Plugins hook into fixed points of the time step (see
//! [`meso_core::SimulationPlugin`]): statistics and dump plugins observe,
//! force and control plugins perturb. Each plugin is registered on the
//! coordinator like any other handler.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

mod dump;
mod flux_plane;
mod forces;
mod stats;
mod velocity_control;

pub use dump::{DumpMesh, DumpObjectStats, DumpParticles, DumpXyz};
pub use flux_plane::ExchangePvsFluxPlane;
pub use forces::{AddForce, AddTorque, ForceSaver};
pub use stats::SimulationStats;
pub use velocity_control::{PidControl, VelocityControl};

pub use meso_core::SimulationPlugin;
