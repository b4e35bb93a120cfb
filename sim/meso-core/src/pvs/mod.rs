//! Particle and object vectors.

pub mod channels;
pub mod object_vector;
pub mod particle_vector;

pub use channels::{names as channel_names, Channel, ChannelData, ChannelRegistry, Persistence};
pub use object_vector::{MembraneVector, RigidMotion, RigidVector};
pub use particle_vector::{ParticleSet, ParticleVector, MARK_VAL};

use meso_types::{Real, Result, SimError};

/// Any registered vector: plain particles, rigid objects or membranes.
///
/// The engine stores all vectors uniformly and downcasts where an operation
/// only makes sense for one kind.
#[derive(Debug)]
pub enum AnyVector {
    /// A plain particle vector.
    Plain(ParticleVector),
    /// A rigid object vector.
    Rigid(RigidVector),
    /// A membrane vector.
    Membrane(MembraneVector),
}

impl AnyVector {
    /// Name of the vector.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.pv().name
    }

    /// The underlying particle vector.
    #[must_use]
    pub fn pv(&self) -> &ParticleVector {
        match self {
            Self::Plain(pv) => pv,
            Self::Rigid(rov) => &rov.pv,
            Self::Membrane(mv) => &mv.pv,
        }
    }

    /// Mutable access to the underlying particle vector.
    pub fn pv_mut(&mut self) -> &mut ParticleVector {
        match self {
            Self::Plain(pv) => pv,
            Self::Rigid(rov) => &mut rov.pv,
            Self::Membrane(mv) => &mut mv.pv,
        }
    }

    /// True for rigid and membrane vectors.
    #[must_use]
    pub fn is_object(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    /// Particles per object, when this is an object vector.
    #[must_use]
    pub fn object_size(&self) -> Option<usize> {
        match self {
            Self::Plain(_) => None,
            Self::Rigid(rov) => Some(rov.object_size),
            Self::Membrane(mv) => Some(mv.object_size()),
        }
    }

    /// Downcast to a rigid vector.
    #[must_use]
    pub fn as_rigid(&self) -> Option<&RigidVector> {
        match self {
            Self::Rigid(rov) => Some(rov),
            _ => None,
        }
    }

    /// Mutable downcast to a rigid vector.
    pub fn as_rigid_mut(&mut self) -> Option<&mut RigidVector> {
        match self {
            Self::Rigid(rov) => Some(rov),
            _ => None,
        }
    }

    /// Downcast to a membrane vector.
    #[must_use]
    pub fn as_membrane(&self) -> Option<&MembraneVector> {
        match self {
            Self::Membrane(mv) => Some(mv),
            _ => None,
        }
    }

    /// Mutable downcast to a membrane vector.
    pub fn as_membrane_mut(&mut self) -> Option<&mut MembraneVector> {
        match self {
            Self::Membrane(mv) => Some(mv),
            _ => None,
        }
    }

    /// Mass of one particle.
    #[must_use]
    pub fn mass(&self) -> Real {
        self.pv().mass
    }
}

/// Check a particle vector name against the reserved words of the
/// registration interface.
pub fn validate_pv_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "none" || name == "all" || name.starts_with('_') {
        return Err(SimError::InvalidPvName(name.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        assert!(validate_pv_name("solvent").is_ok());
        assert!(validate_pv_name("").is_err());
        assert!(validate_pv_name("none").is_err());
        assert!(validate_pv_name("all").is_err());
        assert!(validate_pv_name("_hidden").is_err());
    }

    #[test]
    fn test_any_vector_downcasts() {
        let v = AnyVector::Plain(ParticleVector::new("pv", 1.0));
        assert!(!v.is_object());
        assert!(v.as_rigid().is_none());
        assert_eq!(v.name(), "pv");
    }
}
