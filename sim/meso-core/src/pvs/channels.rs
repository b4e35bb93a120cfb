//! Named per-particle data channels.
//!
//! Interactions, integrators and plugins communicate through typed channels
//! attached to a particle set: `forces` and `densities` are ordinary
//! channels, as are stresses or saved old positions. A channel is either
//! *persistent* (travels with the particle through reordering, exchange and
//! checkpoints) or *transient* (scratch output, cleared every step).

use bytemuck::Zeroable;
use hashbrown::HashMap;
use meso_types::{Real, Stress, Vector3};

/// Canonical channel names.
pub mod names {
    /// Final force output.
    pub const FORCES: &str = "forces";
    /// Intermediate number-density output.
    pub const DENSITIES: &str = "densities";
    /// Virial stress output.
    pub const STRESSES: &str = "stresses";
    /// Positions at the beginning of the step, kept for bounce-back.
    pub const OLD_POSITIONS: &str = "old_positions";
}

/// Whether a channel survives reordering and exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Travels with the particle.
    Persistent,
    /// Scratch data, reset every step.
    Transient,
}

/// Typed channel storage.
#[derive(Debug, Clone)]
pub enum ChannelData {
    /// One `Real` per particle.
    Scalar(Vec<Real>),
    /// One 3-vector per particle.
    Vector(Vec<Vector3<Real>>),
    /// One symmetric stress per particle.
    Stress(Vec<Stress>),
}

impl ChannelData {
    fn len(&self) -> usize {
        match self {
            Self::Scalar(v) => v.len(),
            Self::Vector(v) => v.len(),
            Self::Stress(v) => v.len(),
        }
    }

    fn resize(&mut self, n: usize) {
        match self {
            Self::Scalar(v) => v.resize(n, 0.0),
            Self::Vector(v) => v.resize(n, Vector3::zeros()),
            Self::Stress(v) => v.resize(n, Stress::zeroed()),
        }
    }

    fn clear_values(&mut self) {
        match self {
            Self::Scalar(v) => v.fill(0.0),
            Self::Vector(v) => v.fill(Vector3::zeros()),
            Self::Stress(v) => v.fill(Stress::zeroed()),
        }
    }

    /// Gather `self[src[i]]` into a fresh buffer of the same type.
    fn gathered(&self, order: &[usize]) -> Self {
        match self {
            Self::Scalar(v) => Self::Scalar(order.iter().map(|&i| v[i]).collect()),
            Self::Vector(v) => Self::Vector(order.iter().map(|&i| v[i]).collect()),
            Self::Stress(v) => Self::Stress(order.iter().map(|&i| v[i]).collect()),
        }
    }
}

/// A single channel: data plus persistence.
#[derive(Debug, Clone)]
pub struct Channel {
    /// The values, one entry per particle.
    pub data: ChannelData,
    /// Reordering/exchange behavior.
    pub persistence: Persistence,
}

/// Registry of channels for one particle set.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    entries: HashMap<String, Channel>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a scalar channel; creating it zero-filled if absent.
    pub fn require_scalar(&mut self, name: &str, n: usize, persistence: Persistence) {
        self.entries.entry(name.to_owned()).or_insert(Channel {
            data: ChannelData::Scalar(vec![0.0; n]),
            persistence,
        });
    }

    /// Require a vector channel.
    pub fn require_vector(&mut self, name: &str, n: usize, persistence: Persistence) {
        self.entries.entry(name.to_owned()).or_insert(Channel {
            data: ChannelData::Vector(vec![Vector3::zeros(); n]),
            persistence,
        });
    }

    /// Require a stress channel.
    pub fn require_stress(&mut self, name: &str, n: usize, persistence: Persistence) {
        self.entries.entry(name.to_owned()).or_insert(Channel {
            data: ChannelData::Stress(vec![Stress::zeroed(); n]),
            persistence,
        });
    }

    /// Whether a channel exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Channel names, sorted for determinism.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of persistent channels, sorted.
    #[must_use]
    pub fn persistent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, c)| c.persistence == Persistence::Persistent)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    /// Access a channel.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.entries.get(name)
    }

    /// Mutable access to a channel.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.entries.get_mut(name)
    }

    /// Scalar slice of a channel, if it is scalar.
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&[Real]> {
        match self.entries.get(name)?.data {
            ChannelData::Scalar(ref v) => Some(v),
            _ => None,
        }
    }

    /// Mutable scalar slice.
    pub fn scalar_mut(&mut self, name: &str) -> Option<&mut Vec<Real>> {
        match self.entries.get_mut(name)?.data {
            ChannelData::Scalar(ref mut v) => Some(v),
            _ => None,
        }
    }

    /// Vector slice of a channel, if it is a vector channel.
    #[must_use]
    pub fn vector(&self, name: &str) -> Option<&[Vector3<Real>]> {
        match self.entries.get(name)?.data {
            ChannelData::Vector(ref v) => Some(v),
            _ => None,
        }
    }

    /// Mutable vector slice.
    pub fn vector_mut(&mut self, name: &str) -> Option<&mut Vec<Vector3<Real>>> {
        match self.entries.get_mut(name)?.data {
            ChannelData::Vector(ref mut v) => Some(v),
            _ => None,
        }
    }

    /// Stress slice of a channel.
    #[must_use]
    pub fn stress(&self, name: &str) -> Option<&[Stress]> {
        match self.entries.get(name)?.data {
            ChannelData::Stress(ref v) => Some(v),
            _ => None,
        }
    }

    /// Mutable stress slice.
    pub fn stress_mut(&mut self, name: &str) -> Option<&mut Vec<Stress>> {
        match self.entries.get_mut(name)?.data {
            ChannelData::Stress(ref mut v) => Some(v),
            _ => None,
        }
    }

    /// Take a channel out of the registry (for disjoint borrows during
    /// kernel execution); pair with [`ChannelRegistry::put`].
    pub fn take(&mut self, name: &str) -> Option<Channel> {
        self.entries.remove(name)
    }

    /// Put a taken channel back.
    pub fn put(&mut self, name: &str, channel: Channel) {
        self.entries.insert(name.to_owned(), channel);
    }

    /// Resize every channel to `n` particles (zero-filling growth).
    pub fn resize_all(&mut self, n: usize) {
        for c in self.entries.values_mut() {
            c.data.resize(n);
        }
    }

    /// Zero the values of one channel.
    pub fn clear_channel(&mut self, name: &str) {
        if let Some(c) = self.entries.get_mut(name) {
            c.data.clear_values();
        }
    }

    /// Reorder persistent channels by `order` (entry `i` of the result is
    /// entry `order[i]` of the input); transient channels are resized and
    /// cleared instead.
    pub fn reorder_persistent(&mut self, order: &[usize]) {
        for c in self.entries.values_mut() {
            if c.persistence == Persistence::Persistent {
                c.data = c.data.gathered(order);
            } else {
                c.data.resize(order.len());
                c.data.clear_values();
            }
        }
    }

    /// Keep only entries at the given indices, in order (compaction).
    pub fn compact(&mut self, keep: &[usize]) {
        self.reorder_persistent(keep);
    }

    /// Number of entries each channel holds (0 when empty).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().next().map_or(0, |c| c.data.len())
    }

    /// True when no channels are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_require_and_resize() {
        let mut reg = ChannelRegistry::new();
        reg.require_vector(names::FORCES, 3, Persistence::Transient);
        reg.require_scalar(names::DENSITIES, 3, Persistence::Transient);
        reg.resize_all(5);
        assert_eq!(reg.vector(names::FORCES).unwrap().len(), 5);
        assert_eq!(reg.scalar(names::DENSITIES).unwrap().len(), 5);
    }

    #[test]
    fn test_reorder_persistent_keeps_values() {
        let mut reg = ChannelRegistry::new();
        reg.require_scalar("tag", 3, Persistence::Persistent);
        reg.require_scalar("tmp", 3, Persistence::Transient);
        reg.scalar_mut("tag").unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
        reg.scalar_mut("tmp").unwrap().copy_from_slice(&[9.0, 9.0, 9.0]);

        reg.reorder_persistent(&[2, 0, 1]);
        assert_eq!(reg.scalar("tag").unwrap(), &[3.0, 1.0, 2.0]);
        assert_eq!(reg.scalar("tmp").unwrap(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_take_put_roundtrip() {
        let mut reg = ChannelRegistry::new();
        reg.require_vector(names::FORCES, 2, Persistence::Transient);
        let ch = reg.take(names::FORCES).unwrap();
        assert!(!reg.contains(names::FORCES));
        reg.put(names::FORCES, ch);
        assert!(reg.contains(names::FORCES));
    }
}
