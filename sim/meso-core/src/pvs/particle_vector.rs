//! Plain particle vectors.

use meso_types::{ParticleId, Real, Vector3};

use super::channels::{names, ChannelRegistry, Persistence};

/// Position marker of a dead particle; exchange and cell-list builds skip
/// marked entries and the next compaction drops them.
pub const MARK_VAL: Real = -900.0;

/// One set of particles (the local set or the halo set) in SoA layout.
#[derive(Debug, Default)]
pub struct ParticleSet {
    /// Positions in the local subdomain frame.
    pub positions: Vec<Vector3<Real>>,
    /// Velocities.
    pub velocities: Vec<Vector3<Real>>,
    /// Stable particle identities.
    pub ids: Vec<ParticleId>,
    /// Extra channels; `forces` is always present.
    pub channels: ChannelRegistry,
}

impl ParticleSet {
    /// Empty set with the `forces` channel registered.
    #[must_use]
    pub fn new() -> Self {
        let mut channels = ChannelRegistry::new();
        channels.require_vector(names::FORCES, 0, Persistence::Transient);
        Self {
            positions: Vec::new(),
            velocities: Vec::new(),
            ids: Vec::new(),
            channels,
        }
    }

    /// Number of particles (marked ones included until compaction).
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when the set holds no particles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Append one particle, growing every channel.
    pub fn push(&mut self, position: Vector3<Real>, velocity: Vector3<Real>, id: ParticleId) {
        self.positions.push(position);
        self.velocities.push(velocity);
        self.ids.push(id);
        self.channels.resize_all(self.positions.len());
    }

    /// Drop all particles.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.velocities.clear();
        self.ids.clear();
        self.channels.resize_all(0);
    }

    /// Mark particle `i` as dead.
    pub fn mark(&mut self, i: usize) {
        self.positions[i] = Vector3::new(MARK_VAL, MARK_VAL, MARK_VAL);
    }

    /// True if particle `i` is marked dead.
    #[must_use]
    pub fn is_marked(&self, i: usize) -> bool {
        let p = self.positions[i];
        p.x == MARK_VAL && p.y == MARK_VAL && p.z == MARK_VAL
    }

    /// Remove marked particles, preserving the relative order of the rest.
    /// Returns the number of particles removed.
    pub fn compact_marked(&mut self) -> usize {
        let keep: Vec<usize> = (0..self.len()).filter(|&i| !self.is_marked(i)).collect();
        let removed = self.len() - keep.len();
        if removed > 0 {
            self.apply_selection(&keep);
        }
        removed
    }

    /// Keep only particles at `keep` indices, in that order.
    pub fn apply_selection(&mut self, keep: &[usize]) {
        self.positions = keep.iter().map(|&i| self.positions[i]).collect();
        self.velocities = keep.iter().map(|&i| self.velocities[i]).collect();
        self.ids = keep.iter().map(|&i| self.ids[i]).collect();
        self.channels.compact(keep);
    }

    /// Reorder all arrays so entry `i` of the result is entry `order[i]` of
    /// the input; persistent channels follow, transient channels reset.
    pub fn reorder(&mut self, order: &[usize]) {
        self.apply_selection_keeping_transient(order);
    }

    fn apply_selection_keeping_transient(&mut self, order: &[usize]) {
        self.positions = order.iter().map(|&i| self.positions[i]).collect();
        self.velocities = order.iter().map(|&i| self.velocities[i]).collect();
        self.ids = order.iter().map(|&i| self.ids[i]).collect();
        self.channels.reorder_persistent(order);
    }

    /// Forces slice.
    ///
    /// # Panics
    ///
    /// The `forces` channel always exists for sets built through
    /// [`ParticleSet::new`].
    #[must_use]
    pub fn forces(&self) -> &[Vector3<Real>] {
        #[allow(clippy::expect_used)]
        self.channels
            .vector(names::FORCES)
            .expect("forces channel is always registered")
    }

    /// Mutable forces slice.
    pub fn forces_mut(&mut self) -> &mut Vec<Vector3<Real>> {
        #[allow(clippy::expect_used)]
        self.channels
            .vector_mut(names::FORCES)
            .expect("forces channel is always registered")
    }
}

/// A named set of identical particles: the local set owned by this rank and
/// the halo copies received from (periodic) neighbors.
#[derive(Debug)]
pub struct ParticleVector {
    /// Unique name used in all registration calls.
    pub name: String,
    /// Mass of each particle.
    pub mass: Real,
    /// Particles owned by this rank.
    pub local: ParticleSet,
    /// Ghost particles mirrored across periodic boundaries.
    pub halo: ParticleSet,
}

impl ParticleVector {
    /// Create an empty particle vector.
    #[must_use]
    pub fn new(name: impl Into<String>, mass: Real) -> Self {
        Self {
            name: name.into(),
            mass,
            local: ParticleSet::new(),
            halo: ParticleSet::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_push_grows_channels() {
        let mut set = ParticleSet::new();
        set.push(Vector3::zeros(), Vector3::zeros(), ParticleId::new(0));
        set.push(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros(), ParticleId::new(1));
        assert_eq!(set.len(), 2);
        assert_eq!(set.forces().len(), 2);
    }

    #[test]
    fn test_mark_and_compact() {
        let mut set = ParticleSet::new();
        for i in 0..4 {
            set.push(
                Vector3::new(i as Real, 0.0, 0.0),
                Vector3::zeros(),
                ParticleId::new(i),
            );
        }
        set.mark(1);
        set.mark(3);
        assert_eq!(set.compact_marked(), 2);
        assert_eq!(set.len(), 2);
        assert_eq!(set.ids, vec![ParticleId::new(0), ParticleId::new(2)]);
        assert_eq!(set.forces().len(), 2);
    }
}
