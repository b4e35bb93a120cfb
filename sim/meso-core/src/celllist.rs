//! Cell lists: the uniform-grid neighbor structure of all pairwise
//! interactions.
//!
//! A cell list is built per particle vector and per cutoff radius. Building
//! is a counting sort: count particles per cell, prefix-sum the counts into
//! start offsets, then reorder particles into cell order. A *primary* cell
//! list additionally writes the reordered data back into the particle vector
//! (so particle storage is cell-ordered and the permutation is the
//! identity); secondary lists keep a private copy. Object vectors never use
//! primary lists, since their particle grouping must stay intact.
//!
//! Interaction kernels run over the cell-ordered copies and write their
//! outputs into cell-ordered channel buffers; `accumulate_channel` folds
//! those back into particle order and `gather_channel` does the reverse for
//! input channels.

use meso_types::{ParticleId, Real, Vector3};

use crate::pvs::{ChannelData, ChannelRegistry, ParticleSet};

/// Grid geometry of a cell list.
#[derive(Debug, Clone, Copy)]
pub struct CellGrid {
    /// Number of cells per axis.
    pub ncells: [i32; 3],
    /// Total cell count.
    pub totcells: usize,
    /// Local subdomain size the grid spans.
    pub local_size: Vector3<Real>,
    /// Cell edge lengths.
    pub h: Vector3<Real>,
    /// Inverse cell edge lengths.
    pub invh: Vector3<Real>,
    /// Cutoff radius the grid was built for.
    pub rc: Real,
}

impl CellGrid {
    /// Grid with cells at least `rc` wide spanning `local_size`.
    #[must_use]
    pub fn new(rc: Real, local_size: Vector3<Real>) -> Self {
        let mut ncells = [1i32; 3];
        let mut h = Vector3::zeros();
        for k in 0..3 {
            ncells[k] = ((local_size[k] / rc).floor() as i32).max(1);
            h[k] = local_size[k] / ncells[k] as Real;
        }
        let invh = Vector3::new(1.0 / h.x, 1.0 / h.y, 1.0 / h.z);
        let totcells = (ncells[0] as usize) * (ncells[1] as usize) * (ncells[2] as usize);
        Self {
            ncells,
            totcells,
            local_size,
            h,
            invh,
            rc,
        }
    }

    /// Linearize a cell coordinate.
    #[must_use]
    pub fn encode(&self, ix: i32, iy: i32, iz: i32) -> usize {
        ((iz * self.ncells[1] + iy) * self.ncells[0] + ix) as usize
    }

    /// Inverse of [`CellGrid::encode`].
    #[must_use]
    pub fn decode(&self, cid: usize) -> [i32; 3] {
        let cid = cid as i32;
        [
            cid % self.ncells[0],
            (cid / self.ncells[0]) % self.ncells[1],
            cid / (self.ncells[0] * self.ncells[1]),
        ]
    }

    /// Cell coordinate of a local-frame position, unclamped; entries may be
    /// outside `[0, ncells)` for halo positions.
    #[must_use]
    pub fn cell_along_axes(&self, x: Vector3<Real>) -> [i32; 3] {
        let mut c = [0i32; 3];
        for k in 0..3 {
            c[k] = ((x[k] + 0.5 * self.local_size[k]) * self.invh[k]).floor() as i32;
        }
        c
    }

    /// Cell coordinate clamped into the grid.
    #[must_use]
    pub fn cell_along_axes_clamped(&self, x: Vector3<Real>) -> [i32; 3] {
        let mut c = self.cell_along_axes(x);
        for k in 0..3 {
            c[k] = c[k].clamp(0, self.ncells[k] - 1);
        }
        c
    }

    /// True if the cell coordinate lies inside the grid.
    #[must_use]
    pub fn contains(&self, c: [i32; 3]) -> bool {
        (0..3).all(|k| c[k] >= 0 && c[k] < self.ncells[k])
    }
}

/// A built cell list over one particle set.
#[derive(Debug)]
pub struct CellList {
    /// Grid geometry.
    pub grid: CellGrid,
    /// Whether this list owns the particle vector's storage order.
    pub primary: bool,
    /// Per-cell start offsets into the reordered arrays (`totcells + 1`).
    pub starts: Vec<usize>,
    /// Map from cell order to particle-vector order.
    pub order: Vec<usize>,
    /// Cell-ordered positions.
    pub positions: Vec<Vector3<Real>>,
    /// Cell-ordered velocities.
    pub velocities: Vec<Vector3<Real>>,
    /// Cell-ordered ids.
    pub ids: Vec<ParticleId>,
    /// Cell-ordered channel buffers (kernel inputs and outputs).
    pub channels: ChannelRegistry,
}

impl CellList {
    /// Create an empty cell list for the given cutoff.
    #[must_use]
    pub fn new(rc: Real, local_size: Vector3<Real>, primary: bool) -> Self {
        let grid = CellGrid::new(rc, local_size);
        Self {
            grid,
            primary,
            starts: vec![0; grid.totcells + 1],
            order: Vec::new(),
            positions: Vec::new(),
            velocities: Vec::new(),
            ids: Vec::new(),
            channels: ChannelRegistry::new(),
        }
    }

    /// Number of particles in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when the list holds no particles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Particle index range of one cell.
    #[must_use]
    pub fn cell_range(&self, cid: usize) -> std::ops::Range<usize> {
        self.starts[cid]..self.starts[cid + 1]
    }

    /// Build the list from the particle set, dropping marked particles from
    /// the reordered copy. For a primary list the reordered data is written
    /// back to the set.
    pub fn build(&mut self, set: &mut ParticleSet) {
        let n = set.len();
        let mut cids = Vec::with_capacity(n);
        let mut alive = Vec::with_capacity(n);
        for i in 0..n {
            if set.is_marked(i) {
                continue;
            }
            let c = self.grid.cell_along_axes_clamped(set.positions[i]);
            cids.push(self.grid.encode(c[0], c[1], c[2]));
            alive.push(i);
        }

        let mut sizes = vec![0usize; self.grid.totcells];
        for &cid in &cids {
            sizes[cid] += 1;
        }
        self.starts.resize(self.grid.totcells + 1, 0);
        self.starts[0] = 0;
        for c in 0..self.grid.totcells {
            self.starts[c + 1] = self.starts[c] + sizes[c];
        }

        let mut cursor = self.starts.clone();
        self.order = vec![0; alive.len()];
        for (k, &i) in alive.iter().enumerate() {
            let cid = cids[k];
            self.order[cursor[cid]] = i;
            cursor[cid] += 1;
        }

        self.positions = self.order.iter().map(|&i| set.positions[i]).collect();
        self.velocities = self.order.iter().map(|&i| set.velocities[i]).collect();
        self.ids = self.order.iter().map(|&i| set.ids[i]).collect();

        if self.primary {
            let order = std::mem::take(&mut self.order);
            set.reorder(&order);
            self.order = (0..set.len()).collect();
        }

        self.channels.resize_all(self.positions.len());
    }

    /// Add the cell-ordered values of `name` back into the particle-order
    /// channel of the set.
    pub fn accumulate_channel(&self, name: &str, set: &mut ParticleSet) {
        let Some(src) = self.channels.get(name) else {
            return;
        };
        match (&src.data, set.channels.get_mut(name).map(|c| &mut c.data)) {
            (ChannelData::Scalar(src), Some(ChannelData::Scalar(dst))) => {
                for (k, &i) in self.order.iter().enumerate() {
                    dst[i] += src[k];
                }
            }
            (ChannelData::Vector(src), Some(ChannelData::Vector(dst))) => {
                for (k, &i) in self.order.iter().enumerate() {
                    dst[i] += src[k];
                }
            }
            (ChannelData::Stress(src), Some(ChannelData::Stress(dst))) => {
                for (k, &i) in self.order.iter().enumerate() {
                    dst[i] += src[k];
                }
            }
            _ => {}
        }
    }

    /// Copy the particle-order channel of the set into cell order.
    pub fn gather_channel(&mut self, name: &str, set: &ParticleSet) {
        let Some(src) = set.channels.get(name) else {
            return;
        };
        match (&src.data, self.channels.get_mut(name).map(|c| &mut c.data)) {
            (ChannelData::Scalar(src), Some(ChannelData::Scalar(dst))) => {
                dst.resize(self.order.len(), 0.0);
                for (k, &i) in self.order.iter().enumerate() {
                    dst[k] = src[i];
                }
            }
            (ChannelData::Vector(src), Some(ChannelData::Vector(dst))) => {
                dst.resize(self.order.len(), Vector3::zeros());
                for (k, &i) in self.order.iter().enumerate() {
                    dst[k] = src[i];
                }
            }
            (ChannelData::Stress(src), Some(ChannelData::Stress(dst))) => {
                dst.resize(self.order.len(), bytemuck::Zeroable::zeroed());
                for (k, &i) in self.order.iter().enumerate() {
                    dst[k] = src[i];
                }
            }
            _ => {}
        }
    }

    /// Zero a cell-ordered channel.
    pub fn clear_channel(&mut self, name: &str) {
        self.channels.clear_channel(name);
    }
}

/// Pick the cell list with the smallest cell size still covering `rc`.
#[must_use]
pub fn select_best(lists: &[CellList], rc: Real, tolerance: Real) -> Option<usize> {
    let mut best: Option<(usize, Real)> = None;
    for (i, cl) in lists.iter().enumerate() {
        let diff = cl.grid.rc - rc;
        if diff > -tolerance && best.map_or(true, |(_, d)| diff < d) {
            best = Some((i, diff));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pvs::{channel_names, Persistence};
    use meso_types::ParticleId;

    fn test_set(positions: &[[Real; 3]]) -> ParticleSet {
        let mut set = ParticleSet::new();
        for (i, p) in positions.iter().enumerate() {
            set.push(
                Vector3::new(p[0], p[1], p[2]),
                Vector3::zeros(),
                ParticleId::new(i as u64),
            );
        }
        set
    }

    #[test]
    fn test_grid_encode_decode_roundtrip() {
        let grid = CellGrid::new(1.0, Vector3::new(4.0, 3.0, 5.0));
        assert_eq!(grid.ncells, [4, 3, 5]);
        for cid in 0..grid.totcells {
            let c = grid.decode(cid);
            assert_eq!(grid.encode(c[0], c[1], c[2]), cid);
        }
    }

    #[test]
    fn test_build_counts_all_particles() {
        let mut set = test_set(&[
            [-1.9, -1.9, -1.9],
            [1.9, 1.9, 1.9],
            [0.1, 0.1, 0.1],
            [0.2, 0.1, 0.1],
        ]);
        let mut cl = CellList::new(1.0, Vector3::new(4.0, 4.0, 4.0), false);
        cl.build(&mut set);
        assert_eq!(cl.len(), 4);
        assert_eq!(*cl.starts.last().unwrap(), 4);
        // The two particles near the center share a cell.
        let c = cl.grid.cell_along_axes_clamped(Vector3::new(0.1, 0.1, 0.1));
        let cid = cl.grid.encode(c[0], c[1], c[2]);
        assert_eq!(cl.cell_range(cid).len(), 2);
    }

    #[test]
    fn test_primary_build_reorders_set() {
        let mut set = test_set(&[[1.9, 1.9, 1.9], [-1.9, -1.9, -1.9]]);
        let mut cl = CellList::new(1.0, Vector3::new(4.0, 4.0, 4.0), true);
        cl.build(&mut set);
        // Low cell index first after reordering.
        assert_eq!(set.ids[0], ParticleId::new(1));
        assert_eq!(cl.order, vec![0, 1]);
    }

    #[test]
    fn test_marked_particles_dropped() {
        let mut set = test_set(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        set.mark(0);
        let mut cl = CellList::new(1.0, Vector3::new(4.0, 4.0, 4.0), false);
        cl.build(&mut set);
        assert_eq!(cl.len(), 1);
        assert_eq!(cl.ids[0], ParticleId::new(1));
    }

    #[test]
    fn test_accumulate_channel() {
        let mut set = test_set(&[[1.5, 0.0, 0.0], [-1.5, 0.0, 0.0]]);
        let mut cl = CellList::new(1.0, Vector3::new(4.0, 4.0, 4.0), false);
        cl.build(&mut set);
        cl.channels
            .require_vector(channel_names::FORCES, cl.len(), Persistence::Transient);
        for f in cl.channels.vector_mut(channel_names::FORCES).unwrap() {
            *f = Vector3::new(1.0, 0.0, 0.0);
        }
        cl.accumulate_channel(channel_names::FORCES, &mut set);
        assert_eq!(set.forces()[0], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(set.forces()[1], Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_select_best() {
        let local = Vector3::new(8.0, 8.0, 8.0);
        let lists = vec![
            CellList::new(2.0, local, false),
            CellList::new(1.0, local, false),
        ];
        assert_eq!(select_best(&lists, 1.0, 1e-6), Some(1));
        assert_eq!(select_best(&lists, 1.5, 1e-6), Some(0));
        assert_eq!(select_best(&lists, 2.5, 1e-6), None);
    }
}
