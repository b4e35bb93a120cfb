//! Particle identity and per-particle accumulators.

use bytemuck::{Pod, Zeroable};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Real;

/// Stable 64-bit particle identity.
///
/// Ids are assigned by the initial conditions and travel with the particle
/// through reordering, exchange and checkpoints. Pairwise random kernels use
/// the id pair to draw a symmetric per-pair variate, so ids must be unique
/// within the interacting set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(transparent)]
pub struct ParticleId(pub u64);

impl ParticleId {
    /// Create a particle id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ParticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Symmetric per-particle virial stress, stored as the six independent
/// components `xx, xy, xz, yy, yz, zz`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(C)]
pub struct Stress {
    /// xx component.
    pub xx: Real,
    /// xy component.
    pub xy: Real,
    /// xz component.
    pub xz: Real,
    /// yy component.
    pub yy: Real,
    /// yz component.
    pub yz: Real,
    /// zz component.
    pub zz: Real,
}

impl std::ops::AddAssign for Stress {
    fn add_assign(&mut self, rhs: Self) {
        self.xx += rhs.xx;
        self.xy += rhs.xy;
        self.xz += rhs.xz;
        self.yy += rhs.yy;
        self.yz += rhs.yz;
        self.zz += rhs.zz;
    }
}

impl std::ops::Add for Stress {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}
