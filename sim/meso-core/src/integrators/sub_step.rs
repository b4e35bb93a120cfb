//! Membrane sub-stepping.
//!
//! Membrane elastic forces are much stiffer than the solvent coupling. This
//! integrator freezes the slow forces accumulated over the full step and
//! advances the membrane in several velocity-Verlet sub-steps, re-evaluating
//! only the fast membrane interaction in between.

use meso_types::{DomainInfo, Result, SimError, SimulationState, Vector3};

use super::{save_old_positions, Integrator};
use crate::interactions::membrane::MembraneForces;
use crate::pvs::{channel_names, AnyVector};

/// Sub-stepping integrator for membrane vectors.
pub struct SubStepMembrane {
    name: String,
    substeps: usize,
    fast_forces: MembraneForces,
}

impl SubStepMembrane {
    /// Create a sub-stepping integrator around the fast membrane
    /// interaction. The interaction must not additionally be bound via
    /// `set_interaction`; it is evaluated here.
    #[must_use]
    pub fn new(name: impl Into<String>, substeps: usize, fast_forces: MembraneForces) -> Self {
        Self {
            name: name.into(),
            substeps: substeps.max(1),
            fast_forces,
        }
    }
}

impl Integrator for SubStepMembrane {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage2(
        &mut self,
        state: &SimulationState,
        _domain: &DomainInfo,
        pv: &mut AnyVector,
    ) -> Result<()> {
        let mv = pv.as_membrane_mut().ok_or_else(|| {
            SimError::invalid_config("sub-step integrator can only advance membrane vectors")
        })?;

        let inv_m = 1.0 / mv.pv.mass;
        let dt_sub = state.dt / self.substeps as f32;

        save_old_positions(&mut mv.pv.local);

        // Slow forces: whatever the rest of the step accumulated.
        let slow: Vec<Vector3<f32>> = mv.pv.local.forces().to_vec();

        let mut sub_state = *state;
        sub_state.dt = dt_sub;

        for _ in 0..self.substeps {
            mv.pv.local.forces_mut().copy_from_slice(&slow);
            self.fast_forces.apply(&sub_state, mv)?;

            let crate::pvs::ParticleSet {
                positions,
                velocities,
                channels,
                ..
            } = &mut mv.pv.local;
            let Some(forces) = channels.vector(channel_names::FORCES) else {
                break;
            };
            for ((x, v), f) in positions
                .iter_mut()
                .zip(velocities.iter_mut())
                .zip(forces.iter())
            {
                *v += f * (inv_m * dt_sub);
                *x += *v * dt_sub;
            }

            sub_state.t += dt_sub;
            sub_state.step += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::interactions::membrane::params::{BendingModel, CommonMembraneParams, ShearModel};
    use crate::mesh::Mesh;
    use crate::pvs::MembraneVector;
    use meso_types::ParticleId;

    fn membrane_pv() -> AnyVector {
        let mesh = Mesh::icosphere(1, 1.0);
        let mut mv = MembraneVector::new("rbc", 1.0, mesh.clone());
        for (i, v) in mesh.vertices().iter().enumerate() {
            mv.pv
                .local
                .push(*v * 1.1, Vector3::zeros(), ParticleId::new(i as u64));
        }
        AnyVector::Membrane(mv)
    }

    fn fast_forces() -> MembraneForces {
        let mesh = Mesh::icosphere(1, 1.0);
        MembraneForces::new(
            "int_rbc",
            CommonMembraneParams {
                tot_area: mesh.total_area(mesh.vertices()),
                tot_volume: mesh.total_volume(mesh.vertices()),
                ka_tot: 100.0,
                kv_tot: 100.0,
                gamma_c: 0.0,
                gamma_t: 0.0,
                kbt: 0.0,
            },
            ShearModel::Wlc {
                x0: 0.457,
                ks: 10.0,
                mpow: 2.0,
                kd: 10.0,
            },
            BendingModel::Kantor {
                kb: 0.1,
                theta: 0.0,
            },
            true,
            0.0,
        )
    }

    #[test]
    fn test_substep_shrinks_inflated_membrane() {
        let mut pv = membrane_pv();
        let initial: f32 = pv.pv().local.positions.iter().map(|p| p.norm()).sum();

        let state = SimulationState::new(0.01);
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        let mut integrator = SubStepMembrane::new("substep", 10, fast_forces());
        for _ in 0..5 {
            integrator.stage2(&state, &domain, &mut pv).unwrap();
        }

        let after: f32 = pv.pv().local.positions.iter().map(|p| p.norm()).sum();
        assert!(after < initial, "membrane should relax inward");
    }

    #[test]
    fn test_rejects_plain_vector() {
        let mut pv = AnyVector::Plain(crate::pvs::ParticleVector::new("pv", 1.0));
        let state = SimulationState::new(0.01);
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        let mut integrator = SubStepMembrane::new("substep", 10, fast_forces());
        assert!(integrator.stage2(&state, &domain, &mut pv).is_err());
    }
}
