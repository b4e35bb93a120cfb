//! The generic pairwise interaction framework.
//!
//! A [`PairwiseKernel`] computes the contribution of one ordered particle
//! pair; the drivers in this module traverse cell lists and apply Newton's
//! third law. Self-interactions visit each pair exactly once (half-sweep of
//! the neighborhood); cross-vector and halo passes iterate destination
//! particles against the source cell list.

pub mod density;
pub mod dpd;
pub mod interaction;
pub mod lj;
pub mod mdpd;
pub mod sdpd;

pub use interaction::{PairwiseDensity, PairwiseForces};

use meso_types::{Real, SimulationState, Stress, Vector3};

use crate::celllist::CellList;
use crate::pvs::{channel_names, ParticleSet};

/// One side of an interacting pair, fetched from a cell list or a halo set.
#[derive(Debug, Clone, Copy)]
pub struct PairParticle {
    /// Position (local frame).
    pub r: Vector3<Real>,
    /// Velocity.
    pub u: Vector3<Real>,
    /// Stable id (drives the pairwise random variate).
    pub id: u64,
    /// Particle mass.
    pub mass: Real,
    /// Number density, when the kernel consumes densities.
    pub density: Real,
    /// Object tag for object-aware kernels; `u32::MAX` for loose particles.
    pub tag: u32,
}

/// Output of a pairwise kernel.
pub trait PairOutput: Copy {
    /// The contribution the *source* particle receives.
    fn src_flipped(self) -> Self;
}

impl PairOutput for Real {
    fn src_flipped(self) -> Self {
        self
    }
}

impl PairOutput for Vector3<Real> {
    fn src_flipped(self) -> Self {
        -self
    }
}

/// Force plus virial stress contribution of a pair.
#[derive(Debug, Clone, Copy)]
pub struct ForceStress {
    /// Force on the destination particle.
    pub force: Vector3<Real>,
    /// Half the pair virial; both particles receive it unchanged.
    pub stress: Stress,
}

impl PairOutput for ForceStress {
    fn src_flipped(self) -> Self {
        Self {
            force: -self.force,
            stress: self.stress,
        }
    }
}

/// A pairwise kernel.
pub trait PairwiseKernel {
    /// Output per ordered pair.
    type Out: PairOutput;

    /// Cutoff radius.
    fn rc(&self) -> Real;

    /// Whether [`PairParticle::density`] must be fetched.
    fn needs_density(&self) -> bool {
        false
    }

    /// Whether object tags must be fetched.
    fn needs_tags(&self) -> bool {
        false
    }

    /// Whether a particle interacts with itself (density kernels do).
    fn self_contribution(&self) -> bool {
        false
    }

    /// Per-step setup, e.g. drawing the step seed.
    fn setup(&mut self, _state: &SimulationState) {}

    /// Kernel variant used when the two bound particle vectors are
    /// distinct. Object-aware kernels disable the same-object test here,
    /// since tags of different vectors are unrelated.
    fn for_cross_pair(&self) -> Self
    where
        Self: Sized + Clone,
    {
        self.clone()
    }

    /// Contribution of the ordered pair `dst <- src`. Must return zero
    /// beyond the cutoff.
    fn pair(&self, dst: &PairParticle, src: &PairParticle) -> Self::Out;
}

/// Receives pair contributions for one particle range.
pub trait OutSink<O> {
    /// Accumulate `o` into entry `k`.
    fn add(&mut self, k: usize, o: O);
}

/// Sink adding into a plain slice.
pub struct SliceSink<'a, T>(pub &'a mut [T]);

impl<T: std::ops::AddAssign + Copy> OutSink<T> for SliceSink<'_, T> {
    fn add(&mut self, k: usize, o: T) {
        self.0[k] += o;
    }
}

/// Sink splitting a [`ForceStress`] into force and stress slices.
pub struct ForceStressSink<'a> {
    /// Force output.
    pub forces: &'a mut [Vector3<Real>],
    /// Stress output.
    pub stresses: &'a mut [Stress],
}

impl OutSink<ForceStress> for ForceStressSink<'_> {
    fn add(&mut self, k: usize, o: ForceStress) {
        self.forces[k] += o.force;
        self.stresses[k] += o.stress;
    }
}

/// Discards contributions (halo destinations of non-object vectors).
pub struct NullSink;

impl<O> OutSink<O> for NullSink {
    fn add(&mut self, _k: usize, _o: O) {}
}

/// Read-only particle data a driver iterates over.
pub struct PairInputs<'a> {
    /// Positions.
    pub positions: &'a [Vector3<Real>],
    /// Velocities.
    pub velocities: &'a [Vector3<Real>],
    /// Ids.
    pub ids: &'a [meso_types::ParticleId],
    /// Densities, when fetched.
    pub densities: Option<&'a [Real]>,
    /// Object tags, when fetched.
    pub tags: Option<&'a [Real]>,
    /// Uniform particle mass.
    pub mass: Real,
}

impl<'a> PairInputs<'a> {
    /// Inputs over a cell list's reordered copies.
    #[must_use]
    pub fn from_cell_list(cl: &'a CellList, mass: Real, fetch: Fetch) -> Self {
        Self {
            positions: &cl.positions,
            velocities: &cl.velocities,
            ids: &cl.ids,
            densities: fetch
                .density
                .then(|| cl.channels.scalar(channel_names::DENSITIES))
                .flatten(),
            tags: fetch
                .tags
                .then(|| cl.channels.scalar("object_tags"))
                .flatten(),
            mass,
        }
    }

    /// Inputs over a particle set (halo destinations).
    #[must_use]
    pub fn from_set(set: &'a ParticleSet, mass: Real, fetch: Fetch) -> Self {
        Self {
            positions: &set.positions,
            velocities: &set.velocities,
            ids: &set.ids,
            densities: fetch
                .density
                .then(|| set.channels.scalar(channel_names::DENSITIES))
                .flatten(),
            tags: fetch
                .tags
                .then(|| set.channels.scalar("object_tags"))
                .flatten(),
            mass,
        }
    }

    fn particle(&self, k: usize) -> PairParticle {
        PairParticle {
            r: self.positions[k],
            u: self.velocities[k],
            id: self.ids[k].raw(),
            mass: self.mass,
            density: self.densities.map_or(0.0, |d| d[k]),
            tag: self.tags.map_or(u32::MAX, |t| t[k] as u32),
        }
    }

    /// Number of particles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// What optional per-particle data a kernel fetches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fetch {
    /// Fetch densities.
    pub density: bool,
    /// Fetch object tags.
    pub tags: bool,
}

impl Fetch {
    /// Fetch plan of a kernel.
    #[must_use]
    pub fn for_kernel<K: PairwiseKernel>(kernel: &K) -> Self {
        Self {
            density: kernel.needs_density(),
            tags: kernel.needs_tags(),
        }
    }
}

/// Compute interactions within one cell list, visiting each unordered pair
/// exactly once. Both sides of a pair accumulate into the same sink.
pub fn compute_self<K: PairwiseKernel>(
    kernel: &K,
    cl: &CellList,
    inputs: &PairInputs<'_>,
    sink: &mut impl OutSink<K::Out>,
) {
    let rc2 = kernel.rc() * kernel.rc();
    let grid = cl.grid;

    for dst_k in 0..inputs.len() {
        let dst = inputs.particle(dst_k);
        let c0 = grid.cell_along_axes_clamped(dst.r);

        for dz in -1..=1i32 {
            for dy in -1..=1i32 {
                for dx in -1..=1i32 {
                    let c = [c0[0] + dx, c0[1] + dy, c0[2] + dz];
                    if !grid.contains(c) {
                        continue;
                    }
                    let cid = grid.encode(c[0], c[1], c[2]);
                    for src_k in cl.cell_range(cid) {
                        // Visit each pair once.
                        if src_k >= dst_k {
                            continue;
                        }
                        let src = inputs.particle(src_k);
                        if (dst.r - src.r).norm_squared() > rc2 {
                            continue;
                        }
                        let out = kernel.pair(&dst, &src);
                        sink.add(dst_k, out);
                        sink.add(src_k, out.src_flipped());
                    }
                }
            }
        }

        if kernel.self_contribution() {
            sink.add(dst_k, kernel.pair(&dst, &dst));
        }
    }
}

/// Compute interactions between destination particles and a source cell
/// list. The destination may lie outside the source grid (halo particles).
pub fn compute_external<K: PairwiseKernel>(
    kernel: &K,
    dst_inputs: &PairInputs<'_>,
    dst_sink: &mut impl OutSink<K::Out>,
    src_cl: &CellList,
    src_inputs: &PairInputs<'_>,
    src_sink: &mut impl OutSink<K::Out>,
) {
    let rc2 = kernel.rc() * kernel.rc();
    let grid = src_cl.grid;

    for dst_k in 0..dst_inputs.len() {
        let dst = dst_inputs.particle(dst_k);
        let c0 = grid.cell_along_axes(dst.r);

        for dz in -1..=1i32 {
            for dy in -1..=1i32 {
                for dx in -1..=1i32 {
                    let c = [c0[0] + dx, c0[1] + dy, c0[2] + dz];
                    if !grid.contains(c) {
                        continue;
                    }
                    let cid = grid.encode(c[0], c[1], c[2]);
                    for src_k in src_cl.cell_range(cid) {
                        let src = src_inputs.particle(src_k);
                        if (dst.r - src.r).norm_squared() > rc2 {
                            continue;
                        }
                        let out = kernel.pair(&dst, &src);
                        dst_sink.add(dst_k, out);
                        src_sink.add(src_k, out.src_flipped());
                    }
                }
            }
        }
    }
}

/// Wrap a force kernel so every pair also yields its virial stress.
#[derive(Debug, Clone)]
pub struct WithStress<K>(pub K);

impl<K> PairwiseKernel for WithStress<K>
where
    K: PairwiseKernel<Out = Vector3<Real>>,
{
    type Out = ForceStress;

    fn rc(&self) -> Real {
        self.0.rc()
    }

    fn needs_density(&self) -> bool {
        self.0.needs_density()
    }

    fn needs_tags(&self) -> bool {
        self.0.needs_tags()
    }

    fn setup(&mut self, state: &SimulationState) {
        self.0.setup(state);
    }

    fn pair(&self, dst: &PairParticle, src: &PairParticle) -> ForceStress {
        let force = self.0.pair(dst, src);
        let dr = dst.r - src.r;
        let stress = Stress {
            xx: 0.5 * dr.x * force.x,
            xy: 0.5 * dr.x * force.y,
            xz: 0.5 * dr.x * force.z,
            yy: 0.5 * dr.y * force.y,
            yz: 0.5 * dr.y * force.z,
            zz: 0.5 * dr.z * force.z,
        };
        ForceStress { force, stress }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pvs::ParticleSet;
    use meso_types::ParticleId;

    /// A kernel with a constant unit repulsion inside the cutoff; handy for
    /// counting pair visits.
    #[derive(Clone)]
    struct UnitRepulsion {
        rc: Real,
    }

    impl PairwiseKernel for UnitRepulsion {
        type Out = Vector3<Real>;

        fn rc(&self) -> Real {
            self.rc
        }

        fn pair(&self, dst: &PairParticle, src: &PairParticle) -> Vector3<Real> {
            let dr = dst.r - src.r;
            let r = dr.norm();
            if r > self.rc || r == 0.0 {
                Vector3::zeros()
            } else {
                dr / r
            }
        }
    }

    fn build_cl(positions: &[[Real; 3]], rc: Real, box_l: Real) -> (ParticleSet, CellList) {
        let mut set = ParticleSet::new();
        for (i, p) in positions.iter().enumerate() {
            set.push(
                Vector3::new(p[0], p[1], p[2]),
                Vector3::zeros(),
                ParticleId::new(i as u64),
            );
        }
        let mut cl = CellList::new(rc, Vector3::new(box_l, box_l, box_l), false);
        cl.build(&mut set);
        (set, cl)
    }

    #[test]
    fn test_self_pair_visited_once_and_antisymmetric() {
        let (_, cl) = build_cl(&[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0]], 1.0, 4.0);
        let kernel = UnitRepulsion { rc: 1.0 };
        let mut out = vec![Vector3::zeros(); cl.len()];
        let inputs = PairInputs::from_cell_list(&cl, 1.0, Fetch::default());
        compute_self(&kernel, &cl, &inputs, &mut SliceSink(&mut out));

        // Exactly one visit: forces are +-1 along x.
        let total: Vector3<Real> = out.iter().sum();
        assert!(total.norm() < 1e-6);
        assert!((out[0].norm() - 1.0).abs() < 1e-6);
        assert!((out[1].norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_self_across_cells() {
        // Particles in adjacent cells still interact.
        let (_, cl) = build_cl(&[[-0.1, 0.0, 0.0], [0.4, 0.0, 0.0]], 1.0, 4.0);
        let kernel = UnitRepulsion { rc: 1.0 };
        let mut out = vec![Vector3::zeros(); cl.len()];
        let inputs = PairInputs::from_cell_list(&cl, 1.0, Fetch::default());
        compute_self(&kernel, &cl, &inputs, &mut SliceSink(&mut out));
        assert!(out.iter().all(|f| f.norm() > 0.9));
    }

    #[test]
    fn test_external_newtons_third_law() {
        let (_, src_cl) = build_cl(&[[0.0, 0.0, 0.0]], 1.0, 4.0);
        let mut dst_set = ParticleSet::new();
        dst_set.push(
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::zeros(),
            ParticleId::new(100),
        );

        let kernel = UnitRepulsion { rc: 1.0 };
        let mut dst_out = vec![Vector3::zeros(); 1];
        let mut src_out = vec![Vector3::zeros(); 1];
        let dst_inputs = PairInputs::from_set(&dst_set, 1.0, Fetch::default());
        let src_inputs = PairInputs::from_cell_list(&src_cl, 1.0, Fetch::default());
        compute_external(
            &kernel,
            &dst_inputs,
            &mut SliceSink(&mut dst_out),
            &src_cl,
            &src_inputs,
            &mut SliceSink(&mut src_out),
        );

        assert!((dst_out[0] + src_out[0]).norm() < 1e-6);
        assert!(dst_out[0].x > 0.9);
    }

    #[test]
    fn test_with_stress_accumulates_symmetric_virial() {
        let kernel = WithStress(UnitRepulsion { rc: 1.0 });
        let mk = |x: Real, id: u64| PairParticle {
            r: Vector3::new(x, 0.0, 0.0),
            u: Vector3::zeros(),
            id,
            mass: 1.0,
            density: 0.0,
            tag: u32::MAX,
        };
        let out = kernel.pair(&mk(0.5, 0), &mk(0.0, 1));
        let flipped = out.src_flipped();
        assert_eq!(out.stress.xx, flipped.stress.xx);
        assert_eq!(out.force, -flipped.force);
        assert!(out.stress.xx > 0.0);
    }
}
