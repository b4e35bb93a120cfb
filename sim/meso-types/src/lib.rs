//! Core types for mesoscale particle dynamics.
//!
//! This crate provides the foundational types shared by every part of a
//! mesodyn simulation:
//!
//! - [`SimulationState`] - current time, step counter and timestep
//! - [`DomainInfo`] - periodic global domain and the local subdomain frame
//! - [`CoordinatorConfig`] - rank layout, domain size, logging, checkpointing
//! - [`ParticleId`] - stable 64-bit particle identity
//! - [`Stress`] - per-particle virial stress accumulator
//! - [`SimError`] - the error taxonomy for the whole workspace
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They carry no forces, no integration and no
//! scheduling; they are the common language between the engine crate, the
//! plugins and user-facing drivers.
//!
//! # Coordinate System
//!
//! The global domain is a periodic box `[0, L)` per axis. Each rank owns a
//! subdomain and stores particle positions in a *local frame centered on the
//! subdomain*, i.e. local coordinates span `[-l/2, l/2)` per axis. All
//! conversions go through [`DomainInfo`].
//!
//! # Example
//!
//! ```
//! use meso_types::{DomainInfo, SimulationState};
//! use nalgebra::Vector3;
//!
//! let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
//! let global = Vector3::new(7.5, 0.5, 4.0);
//! let local = domain.global_to_local(global);
//! assert!((domain.local_to_global(local) - global).norm() < 1e-5);
//!
//! let state = SimulationState::new(0.001);
//! assert_eq!(state.step, 0);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

mod config;
mod domain;
mod error;
mod particle;
mod state;

pub use config::{CoordinatorConfig, LogTarget};
pub use domain::DomainInfo;
pub use error::SimError;
pub use particle::{ParticleId, Stress};
pub use state::SimulationState;

// Re-export math types for convenience
pub use nalgebra::{UnitQuaternion, Vector3};

/// Scalar type of the engine state. The engine is single precision;
/// diagnostics that need it accumulate in `f64`.
pub type Real = f32;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
