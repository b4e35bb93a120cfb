//! [`Interaction`] adapters around pairwise kernels.

use meso_types::{Real, Result, SimulationState, Vector3};

use super::density::{DensityKernel, DensityWeight};
use super::{
    compute_external, compute_self, Fetch, ForceStressSink, NullSink, PairInputs, PairwiseKernel,
    SliceSink, WithStress,
};
use crate::celllist::CellList;
use crate::interactions::{
    ExecTarget, Interaction, InteractionChannel, InteractionStage,
};
use crate::pvs::{channel_names, AnyVector, ParticleSet};

/// A final pairwise interaction producing forces (and optionally stresses).
#[derive(Debug)]
pub struct PairwiseForces<K> {
    name: String,
    kernel: K,
    stress_period: Option<Real>,
    stress_active: bool,
    last_stress_time: Real,
}

impl<K> PairwiseForces<K>
where
    K: PairwiseKernel<Out = Vector3<Real>> + Clone,
{
    /// Create a force interaction around a kernel.
    #[must_use]
    pub fn new(name: impl Into<String>, kernel: K) -> Self {
        Self {
            name: name.into(),
            kernel,
            stress_period: None,
            stress_active: false,
            last_stress_time: -1.0,
        }
    }

    /// Also accumulate per-particle virial stresses every `period` time
    /// units.
    #[must_use]
    pub fn with_stress(mut self, period: Real) -> Self {
        self.stress_period = Some(period);
        self
    }

    fn run_local(
        &self,
        kernel: &K,
        cl1: &mut CellList,
        mass1: Real,
        other: Option<(&mut CellList, Real)>,
    ) {
        let fetch = Fetch::for_kernel(kernel);
        match other {
            None => {
                with_force_output(cl1, self.stress_active, |cl, sink_forces, sink_stresses| {
                    let inputs = PairInputs::from_cell_list(cl, mass1, fetch);
                    if self.stress_active {
                        let k = WithStress(kernel.clone());
                        let mut sink = ForceStressSink {
                            forces: sink_forces,
                            stresses: sink_stresses,
                        };
                        compute_self(&k, cl, &inputs, &mut sink);
                    } else {
                        compute_self(kernel, cl, &inputs, &mut SliceSink(sink_forces));
                    }
                });
            }
            Some((cl2, mass2)) => {
                // Take both force outputs so the remaining borrows are
                // immutable reads of positions/velocities.
                with_two_force_outputs(
                    cl1,
                    cl2,
                    self.stress_active,
                    |cl1, cl2, f1, s1, f2, s2| {
                        let dst_inputs = PairInputs::from_cell_list(cl1, mass1, fetch);
                        let src_inputs = PairInputs::from_cell_list(cl2, mass2, fetch);
                        if self.stress_active {
                            let k = WithStress(kernel.clone());
                            let mut dst_sink = ForceStressSink {
                                forces: f1,
                                stresses: s1,
                            };
                            let mut src_sink = ForceStressSink {
                                forces: f2,
                                stresses: s2,
                            };
                            compute_external(
                                &k,
                                &dst_inputs,
                                &mut dst_sink,
                                cl2,
                                &src_inputs,
                                &mut src_sink,
                            );
                        } else {
                            compute_external(
                                kernel,
                                &dst_inputs,
                                &mut SliceSink(f1),
                                cl2,
                                &src_inputs,
                                &mut SliceSink(f2),
                            );
                        }
                    },
                );
            }
        }
    }

    fn run_halo_side(&self, kernel: &K, dst: &mut AnyVector, src_cl: &mut CellList, src_mass: Real) {
        let fetch = Fetch::for_kernel(kernel);
        let dst_is_object = dst.is_object();
        let dst_mass = dst.mass();
        let halo: &mut ParticleSet = &mut dst.pv_mut().halo;
        if halo.is_empty() {
            return;
        }

        // Halo destinations of object vectors keep their forces for the
        // reverse exchange; loose halo particles do not.
        let taken = if dst_is_object {
            halo.channels.take(channel_names::FORCES)
        } else {
            None
        };
        let mut dst_forces = match taken {
            Some(crate::pvs::Channel {
                data: crate::pvs::ChannelData::Vector(v),
                persistence,
            }) => Some((v, persistence)),
            Some(other) => {
                halo.channels.put(channel_names::FORCES, other);
                None
            }
            None => None,
        };

        with_force_output(src_cl, false, |src_cl, src_forces, _| {
            let dst_inputs = PairInputs::from_set(halo, dst_mass, fetch);
            let src_inputs = PairInputs::from_cell_list(src_cl, src_mass, fetch);
            match dst_forces {
                Some((ref mut forces, _)) => compute_external(
                    kernel,
                    &dst_inputs,
                    &mut SliceSink(forces),
                    src_cl,
                    &src_inputs,
                    &mut SliceSink(src_forces),
                ),
                None => compute_external(
                    kernel,
                    &dst_inputs,
                    &mut NullSink,
                    src_cl,
                    &src_inputs,
                    &mut SliceSink(src_forces),
                ),
            }
        });

        if let Some((v, persistence)) = dst_forces {
            halo.channels.put(
                channel_names::FORCES,
                crate::pvs::Channel {
                    data: crate::pvs::ChannelData::Vector(v),
                    persistence,
                },
            );
        }
    }
}

impl<K> Interaction for PairwiseForces<K>
where
    K: PairwiseKernel<Out = Vector3<Real>> + Clone,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn rc(&self) -> Real {
        self.kernel.rc()
    }

    fn stage(&self) -> InteractionStage {
        InteractionStage::Final
    }

    fn input_channels(&self) -> Vec<InteractionChannel> {
        let mut inputs = Vec::new();
        if self.kernel.needs_density() {
            inputs.push(InteractionChannel::always(channel_names::DENSITIES));
        }
        if self.kernel.needs_tags() {
            inputs.push(InteractionChannel::always("object_tags"));
        }
        inputs
    }

    fn output_channels(&self) -> Vec<InteractionChannel> {
        let mut outputs = vec![InteractionChannel::always(channel_names::FORCES)];
        if self.stress_period.is_some() {
            outputs.push(InteractionChannel::always(channel_names::STRESSES));
        }
        outputs
    }

    fn setup(&mut self, state: &SimulationState) {
        self.kernel.setup(state);
        if let Some(period) = self.stress_period {
            if state.t - self.last_stress_time >= period || self.last_stress_time < 0.0 {
                self.stress_active = true;
                self.last_stress_time = state.t;
            } else {
                self.stress_active = false;
            }
        }
    }

    fn exec_local(&mut self, _state: &SimulationState, target: ExecTarget<'_>) -> Result<()> {
        let mass1 = target.pv1.mass();
        match target.other {
            None => {
                let kernel = self.kernel.clone();
                self.run_local(&kernel, target.cl1, mass1, None);
            }
            Some((pv2, cl2)) => {
                let kernel = self.kernel.for_cross_pair();
                let mass2 = pv2.mass();
                self.run_local(&kernel, target.cl1, mass1, Some((cl2, mass2)));
            }
        }
        Ok(())
    }

    fn exec_halo(&mut self, _state: &SimulationState, target: ExecTarget<'_>) -> Result<()> {
        match target.other {
            None => {
                let kernel = self.kernel.clone();
                let mass = target.pv1.mass();
                self.run_halo_side(&kernel, target.pv1, target.cl1, mass);
            }
            Some((pv2, cl2)) => {
                let kernel = self.kernel.for_cross_pair();
                let mass1 = target.pv1.mass();
                let mass2 = pv2.mass();
                self.run_halo_side(&kernel, target.pv1, cl2, mass2);
                self.run_halo_side(&kernel, pv2, target.cl1, mass1);
            }
        }
        Ok(())
    }
}

/// An intermediate pairwise interaction accumulating densities.
#[derive(Debug)]
pub struct PairwiseDensity<W: DensityWeight> {
    name: String,
    kernel: DensityKernel<W>,
}

impl<W: DensityWeight> PairwiseDensity<W> {
    /// Create a density interaction.
    #[must_use]
    pub fn new(name: impl Into<String>, kernel: DensityKernel<W>) -> Self {
        Self {
            name: name.into(),
            kernel,
        }
    }
}

impl<W: DensityWeight> Interaction for PairwiseDensity<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn rc(&self) -> Real {
        self.kernel.rc()
    }

    fn stage(&self) -> InteractionStage {
        InteractionStage::Intermediate
    }

    fn output_channels(&self) -> Vec<InteractionChannel> {
        vec![InteractionChannel::always(channel_names::DENSITIES)]
    }

    fn exec_local(&mut self, _state: &SimulationState, target: ExecTarget<'_>) -> Result<()> {
        let mass1 = target.pv1.mass();
        match target.other {
            None => {
                with_density_output(target.cl1, |cl, out| {
                    let inputs = PairInputs::from_cell_list(cl, mass1, Fetch::default());
                    compute_self(&self.kernel, cl, &inputs, &mut SliceSink(out));
                });
            }
            Some((pv2, cl2)) => {
                let mass2 = pv2.mass();
                with_two_density_outputs(target.cl1, cl2, |cl1, cl2, out1, out2| {
                    let dst_inputs = PairInputs::from_cell_list(cl1, mass1, Fetch::default());
                    let src_inputs = PairInputs::from_cell_list(cl2, mass2, Fetch::default());
                    compute_external(
                        &self.kernel,
                        &dst_inputs,
                        &mut SliceSink(out1),
                        cl2,
                        &src_inputs,
                        &mut SliceSink(out2),
                    );
                });
            }
        }
        Ok(())
    }

    fn exec_halo(&mut self, _state: &SimulationState, target: ExecTarget<'_>) -> Result<()> {
        // Halo densities are overwritten by the final halo exchange; only
        // the local side accumulates here.
        let mut run = |dst: &mut AnyVector, src_cl: &mut CellList, src_mass: Real| {
            let dst_mass = dst.mass();
            let halo = &dst.pv_mut().halo;
            if halo.is_empty() {
                return;
            }
            with_density_output(src_cl, |src_cl, out| {
                let dst_inputs = PairInputs::from_set(halo, dst_mass, Fetch::default());
                let src_inputs = PairInputs::from_cell_list(src_cl, src_mass, Fetch::default());
                // The self-contribution of halo particles is not ours to add.
                compute_external(
                    &self.kernel,
                    &dst_inputs,
                    &mut NullSink,
                    src_cl,
                    &src_inputs,
                    &mut SliceSink(out),
                );
            });
        };

        match target.other {
            None => {
                let mass = target.pv1.mass();
                run(target.pv1, target.cl1, mass);
            }
            Some((pv2, cl2)) => {
                let mass1 = target.pv1.mass();
                let mass2 = pv2.mass();
                run(target.pv1, cl2, mass2);
                run(pv2, target.cl1, mass1);
            }
        }
        Ok(())
    }
}

fn with_force_output(
    cl: &mut CellList,
    with_stress: bool,
    f: impl FnOnce(&CellList, &mut [Vector3<Real>], &mut [meso_types::Stress]),
) {
    let n = cl.len();
    cl.channels
        .require_vector(channel_names::FORCES, n, crate::pvs::Persistence::Transient);
    let mut forces = match cl.channels.take(channel_names::FORCES) {
        Some(ch) => ch,
        None => return,
    };
    let mut stresses = if with_stress {
        cl.channels
            .require_stress(channel_names::STRESSES, n, crate::pvs::Persistence::Transient);
        cl.channels.take(channel_names::STRESSES)
    } else {
        None
    };

    {
        let forces_slice = match forces.data {
            crate::pvs::ChannelData::Vector(ref mut v) => v.as_mut_slice(),
            _ => &mut [],
        };
        let mut empty: [meso_types::Stress; 0] = [];
        let stress_slice: &mut [meso_types::Stress] = match stresses {
            Some(ref mut ch) => match ch.data {
                crate::pvs::ChannelData::Stress(ref mut v) => v.as_mut_slice(),
                _ => &mut empty,
            },
            None => &mut empty,
        };
        f(cl, forces_slice, stress_slice);
    }

    cl.channels.put(channel_names::FORCES, forces);
    if let Some(ch) = stresses {
        cl.channels.put(channel_names::STRESSES, ch);
    }
}

fn with_two_force_outputs(
    cl1: &mut CellList,
    cl2: &mut CellList,
    with_stress: bool,
    f: impl FnOnce(
        &CellList,
        &CellList,
        &mut [Vector3<Real>],
        &mut [meso_types::Stress],
        &mut [Vector3<Real>],
        &mut [meso_types::Stress],
    ),
) {
    with_force_output(cl1, with_stress, |cl1_ref, f1, s1| {
        // cl1 is frozen (immutable) inside; cl2 still mutable here.
        with_force_output(cl2, with_stress, |cl2_ref, f2, s2| {
            f(cl1_ref, cl2_ref, f1, s1, f2, s2);
        });
    });
}

fn with_density_output(cl: &mut CellList, f: impl FnOnce(&CellList, &mut [Real])) {
    let n = cl.len();
    cl.channels.require_scalar(
        channel_names::DENSITIES,
        n,
        crate::pvs::Persistence::Transient,
    );
    let mut densities = match cl.channels.take(channel_names::DENSITIES) {
        Some(ch) => ch,
        None => return,
    };
    if let crate::pvs::ChannelData::Scalar(ref mut v) = densities.data {
        f(cl, v);
    }
    cl.channels.put(channel_names::DENSITIES, densities);
}

fn with_two_density_outputs(
    cl1: &mut CellList,
    cl2: &mut CellList,
    f: impl FnOnce(&CellList, &CellList, &mut [Real], &mut [Real]),
) {
    with_density_output(cl1, |cl1_ref, d1| {
        with_density_output(cl2, |cl2_ref, d2| {
            f(cl1_ref, cl2_ref, d1, d2);
        });
    });
}
