//! Mesoscale particle dynamics engine.
//!
//! This crate provides the full simulation machinery behind the
//! [`Coordinator`]: particle and object vectors, cell lists, the
//! DPD-family pairwise interactions, membrane and rigid-body mechanics,
//! SDF walls, belonging checkers, the periodic exchange engines and the
//! dependency-scheduled time step. It builds on [`meso_types`] for the
//! shared data structures.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Coordinator                            │
//! │  register / set / apply calls, run, checkpoint, restart     │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Simulation                            │
//! │  Resolves registrations into cell lists, channel wiring,    │
//! │  exchange engines and the compiled task graph               │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TaskScheduler                           │
//! │  build cells → clear → halo → forces → integrate → bounce   │
//! │  → redistribute, ordered by explicit dependencies           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use meso_core::coordinator::Coordinator;
//! use meso_core::ic::UniformIc;
//! use meso_core::integrators::VelocityVerlet;
//! use meso_core::interactions::factory;
//! use meso_core::pvs::{AnyVector, ParticleVector};
//! use meso_types::{CoordinatorConfig, Vector3};
//!
//! let config = CoordinatorConfig::new(Vector3::new(4.0, 4.0, 4.0), 0.001)
//!     .with_log_filename("stderr");
//! let mut u = Coordinator::new(config)?;
//!
//! let pv = AnyVector::Plain(ParticleVector::new("solvent", 1.0));
//! u.register_particle_vector(pv, Some(&UniformIc::new(4.0)), 0)?;
//!
//! u.register_interaction(factory::dpd("dpd", 1.0, 10.0, 10.0, 1.0, 0.5))?;
//! u.set_interaction("dpd", "solvent", "solvent")?;
//!
//! u.register_integrator(Box::new(VelocityVerlet::new("vv")))?;
//! u.set_integrator("vv", "solvent")?;
//!
//! u.run(10)?;
//! # Ok::<(), meso_types::SimError>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod belonging;
pub mod bouncers;
pub mod celllist;
pub mod checkpoint;
pub mod coordinator;
pub mod exchange;
pub mod ic;
pub mod integrators;
pub mod interactions;
pub mod logging;
pub mod mesh;
pub mod plugin;
pub mod pvs;
pub mod rng;
pub mod scheduler;
pub mod simulation;
pub mod walls;

pub use coordinator::Coordinator;
pub use mesh::Mesh;
pub use plugin::{PluginHook, SimulationPlugin};
pub use simulation::Simulation;

// Re-export the shared types for convenience.
pub use meso_types::{
    CoordinatorConfig, DomainInfo, ParticleId, Real, Result, SimError, SimulationState, Stress,
    Vector3,
};
