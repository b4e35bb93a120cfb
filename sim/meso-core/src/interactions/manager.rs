//! Bookkeeping and execution of interaction bindings.
//!
//! There are two kinds of interactions: *final* ones produce forces and
//! stresses; *intermediate* ones produce quantities the final ones consume,
//! e.g. densities. The manager tracks which channels live on which cell
//! lists, clears and folds them at the right points of the step, executes
//! the local and halo passes, and answers the queries the exchange setup
//! needs (largest cell list per vector, extra channels to ship).

use hashbrown::{HashMap, HashSet};
use meso_types::{Real, Result, SimError, SimulationState};

use super::{pair_mut, ExecTarget, Interaction, InteractionChannel, InteractionStage};
use crate::celllist::CellList;
use crate::pvs::{channel_names, AnyVector, ChannelRegistry, Persistence};

/// One `set_interaction` binding resolved to indices.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Interaction name.
    pub interaction: String,
    /// First particle vector index.
    pub pv1: usize,
    /// Second particle vector index (may equal `pv1`).
    pub pv2: usize,
    /// Cell list index of `pv1`.
    pub cl1: usize,
    /// Cell list index of `pv2`.
    pub cl2: usize,
    /// Stage of the interaction.
    pub stage: InteractionStage,
    /// Cutoff.
    pub rc: Real,
    /// Output channels.
    pub outputs: Vec<InteractionChannel>,
    /// Input channels.
    pub inputs: Vec<InteractionChannel>,
}

/// Manager of all interaction bindings.
#[derive(Debug, Default)]
pub struct InteractionManager {
    bindings: Vec<Binding>,
}

fn require_by_name(registry: &mut ChannelRegistry, name: &str, n: usize) {
    match name {
        channel_names::DENSITIES => registry.require_scalar(name, n, Persistence::Transient),
        channel_names::STRESSES => registry.require_stress(name, n, Persistence::Transient),
        "object_tags" => registry.require_scalar(name, n, Persistence::Persistent),
        _ => registry.require_vector(name, n, Persistence::Transient),
    }
}

impl InteractionManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding.
    pub fn add(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    /// All bindings.
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Whether any intermediate-stage bindings exist.
    #[must_use]
    pub fn has_intermediate(&self) -> bool {
        self.bindings
            .iter()
            .any(|b| b.stage == InteractionStage::Intermediate)
    }

    /// Largest cutoff over all bindings.
    #[must_use]
    pub fn max_effective_cutoff(&self) -> Real {
        self.bindings.iter().map(|b| b.rc).fold(0.0, Real::max)
    }

    /// Create every channel the bindings need on the particle sets and cell
    /// lists.
    pub fn prepare_channels(&self, pvs: &mut [AnyVector], cell_lists: &mut [Vec<CellList>]) {
        for b in &self.bindings {
            for &(pv_idx, cl_idx) in &[(b.pv1, b.cl1), (b.pv2, b.cl2)] {
                let names = b
                    .outputs
                    .iter()
                    .chain(b.inputs.iter())
                    .map(|c| c.name.clone())
                    .collect::<Vec<_>>();
                for name in names {
                    let pv = &mut pvs[pv_idx];
                    let n_local = pv.pv().local.len();
                    let n_halo = pv.pv().halo.len();
                    require_by_name(&mut pv.pv_mut().local.channels, &name, n_local);
                    require_by_name(&mut pv.pv_mut().halo.channels, &name, n_halo);
                    let cl = &mut cell_lists[pv_idx][cl_idx];
                    let n_cl = cl.len();
                    require_by_name(&mut cl.channels, &name, n_cl);
                }
            }
        }
    }

    /// Verify that every final-stage input is produced by an intermediate
    /// binding on the same particle vectors.
    ///
    /// # Errors
    ///
    /// Reports the first missing producer.
    pub fn check(&self, pvs: &[AnyVector]) -> Result<()> {
        for b in &self.bindings {
            if b.stage != InteractionStage::Final {
                continue;
            }
            for input in &b.inputs {
                // Persistent channels (object tags) come from the vectors
                // themselves.
                if input.name == "object_tags" {
                    continue;
                }
                let produced = self.bindings.iter().any(|p| {
                    p.stage == InteractionStage::Intermediate
                        && p.outputs.iter().any(|c| c.name == input.name)
                        && (p.pv1 == b.pv1 || p.pv1 == b.pv2 || p.pv2 == b.pv1 || p.pv2 == b.pv2)
                });
                if !produced {
                    return Err(SimError::invalid_config(format!(
                        "interaction '{}' needs channel '{}' for '{}'/'{}', but no intermediate \
                         interaction produces it",
                        b.interaction,
                        input.name,
                        pvs[b.pv1].name(),
                        pvs[b.pv2].name(),
                    )));
                }
            }
        }
        Ok(())
    }

    fn stage_channels_for_pv(&self, pv: usize, stage: InteractionStage, t: Real) -> Vec<String> {
        let mut names = HashSet::new();
        for b in &self.bindings {
            if b.stage != stage || (b.pv1 != pv && b.pv2 != pv) {
                continue;
            }
            for c in &b.outputs {
                if c.active.is_active(t) {
                    names.insert(c.name.clone());
                }
            }
        }
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names
    }

    /// Clear a vector's local stage outputs: the particle-order channels
    /// and every cell-list buffer of that stage.
    pub fn clear_stage_local(
        &self,
        pv_idx: usize,
        stage: InteractionStage,
        t: Real,
        pvs: &mut [AnyVector],
        cell_lists: &mut [Vec<CellList>],
    ) {
        for name in self.stage_channels_for_pv(pv_idx, stage, t) {
            pvs[pv_idx].pv_mut().local.channels.clear_channel(&name);
            for cl in &mut cell_lists[pv_idx] {
                cl.clear_channel(&name);
            }
        }
        // Forces are cleared even without bindings, so integrators of
        // force-free vectors see zeros rather than stale data.
        if stage == InteractionStage::Final {
            pvs[pv_idx]
                .pv_mut()
                .local
                .channels
                .clear_channel(channel_names::FORCES);
        }
    }

    /// Clear a vector's halo stage outputs.
    pub fn clear_stage_halo(
        &self,
        pv_idx: usize,
        stage: InteractionStage,
        t: Real,
        pvs: &mut [AnyVector],
    ) {
        for name in self.stage_channels_for_pv(pv_idx, stage, t) {
            pvs[pv_idx].pv_mut().halo.channels.clear_channel(&name);
        }
        if stage == InteractionStage::Final {
            pvs[pv_idx]
                .pv_mut()
                .halo
                .channels
                .clear_channel(channel_names::FORCES);
        }
    }

    /// Fold cell-list buffers of a stage back into particle order.
    pub fn accumulate_stage(
        &self,
        stage: InteractionStage,
        t: Real,
        pvs: &mut [AnyVector],
        cell_lists: &mut [Vec<CellList>],
    ) {
        let mut seen: HashSet<(usize, usize, String)> = HashSet::new();
        for b in &self.bindings {
            if b.stage != stage {
                continue;
            }
            for &(pv_idx, cl_idx) in &[(b.pv1, b.cl1), (b.pv2, b.cl2)] {
                for c in &b.outputs {
                    if !c.active.is_active(t) {
                        continue;
                    }
                    if !seen.insert((pv_idx, cl_idx, c.name.clone())) {
                        continue;
                    }
                    let cl = &cell_lists[pv_idx][cl_idx];
                    cl.accumulate_channel(&c.name, &mut pvs[pv_idx].pv_mut().local);
                }
            }
        }
    }

    /// Copy final-stage input channels (densities, tags) from particle
    /// order into the cell lists that serve as interaction sources.
    pub fn gather_inputs(
        &self,
        t: Real,
        pvs: &mut [AnyVector],
        cell_lists: &mut [Vec<CellList>],
    ) {
        let mut seen: HashSet<(usize, usize, String)> = HashSet::new();
        for b in &self.bindings {
            if b.stage != InteractionStage::Final {
                continue;
            }
            for &(pv_idx, cl_idx) in &[(b.pv1, b.cl1), (b.pv2, b.cl2)] {
                for c in &b.inputs {
                    if !c.active.is_active(t) {
                        continue;
                    }
                    if !seen.insert((pv_idx, cl_idx, c.name.clone())) {
                        continue;
                    }
                    let cl = &mut cell_lists[pv_idx][cl_idx];
                    cl.gather_channel(&c.name, &pvs[pv_idx].pv().local);
                }
            }
        }
    }

    /// Execute every binding of one stage, local or halo pass.
    ///
    /// # Errors
    ///
    /// Propagates interaction execution errors.
    pub fn execute(
        &self,
        stage: InteractionStage,
        halo: bool,
        state: &SimulationState,
        pvs: &mut [AnyVector],
        cell_lists: &mut [Vec<CellList>],
        interactions: &mut HashMap<String, Box<dyn Interaction>>,
    ) -> Result<()> {
        for b in &self.bindings {
            if b.stage != stage {
                continue;
            }
            let interaction = interactions
                .get_mut(&b.interaction)
                .ok_or_else(|| SimError::not_found("interaction", &b.interaction))?;

            if b.pv1 == b.pv2 {
                let target = ExecTarget {
                    pv1: &mut pvs[b.pv1],
                    cl1: &mut cell_lists[b.pv1][b.cl1],
                    other: None,
                };
                if halo {
                    interaction.exec_halo(state, target)?;
                } else {
                    interaction.exec_local(state, target)?;
                }
            } else {
                let (pv1, pv2) = pair_mut(pvs, b.pv1, b.pv2);
                let (cls1, cls2) = pair_mut(cell_lists, b.pv1, b.pv2);
                let target = ExecTarget {
                    pv1,
                    cl1: &mut cls1[b.cl1],
                    other: Some((pv2, &mut cls2[b.cl2])),
                };
                if halo {
                    interaction.exec_halo(state, target)?;
                } else {
                    interaction.exec_local(state, target)?;
                }
            }
        }
        Ok(())
    }

    /// Cell list with the largest cutoff a stage uses for this vector.
    #[must_use]
    pub fn largest_cell_list(&self, pv_idx: usize, stage: InteractionStage) -> Option<usize> {
        let mut best: Option<(usize, Real)> = None;
        for b in &self.bindings {
            if b.stage != stage {
                continue;
            }
            for &(pv, cl) in &[(b.pv1, b.cl1), (b.pv2, b.cl2)] {
                if pv == pv_idx && best.map_or(true, |(_, rc)| b.rc > rc) {
                    best = Some((cl, b.rc));
                }
            }
        }
        best.map(|(cl, _)| cl)
    }

    /// Names of intermediate outputs on this vector; these must travel with
    /// the final halo exchange.
    #[must_use]
    pub fn extra_intermediate_channels(&self, pv_idx: usize) -> Vec<String> {
        self.stage_channels_for_pv(pv_idx, InteractionStage::Intermediate, Real::MAX)
    }

    /// Names of final outputs on this vector (reverse object exchange).
    #[must_use]
    pub fn extra_final_channels(&self, pv_idx: usize) -> Vec<String> {
        self.stage_channels_for_pv(pv_idx, InteractionStage::Final, Real::MAX)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::interactions::ActivePredicate;

    fn binding(
        name: &str,
        pv1: usize,
        pv2: usize,
        stage: InteractionStage,
        rc: Real,
        outputs: &[&str],
        inputs: &[&str],
    ) -> Binding {
        Binding {
            interaction: name.into(),
            pv1,
            pv2,
            cl1: 0,
            cl2: 0,
            stage,
            rc,
            outputs: outputs
                .iter()
                .map(|n| InteractionChannel {
                    name: (*n).to_owned(),
                    active: ActivePredicate::Always,
                })
                .collect(),
            inputs: inputs
                .iter()
                .map(|n| InteractionChannel {
                    name: (*n).to_owned(),
                    active: ActivePredicate::Always,
                })
                .collect(),
        }
    }

    #[test]
    fn test_check_catches_missing_density_producer() {
        let mut manager = InteractionManager::new();
        manager.add(binding(
            "mdpd",
            0,
            0,
            InteractionStage::Final,
            1.0,
            &["forces"],
            &["densities"],
        ));
        let pvs = vec![AnyVector::Plain(crate::pvs::ParticleVector::new("pv", 1.0))];
        assert!(manager.check(&pvs).is_err());

        manager.add(binding(
            "den",
            0,
            0,
            InteractionStage::Intermediate,
            1.0,
            &["densities"],
            &[],
        ));
        assert!(manager.check(&pvs).is_ok());
    }

    #[test]
    fn test_largest_cell_list_and_cutoff() {
        let mut manager = InteractionManager::new();
        let mut b1 = binding("a", 0, 1, InteractionStage::Final, 1.0, &["forces"], &[]);
        b1.cl1 = 2;
        manager.add(b1);
        let mut b2 = binding("b", 0, 0, InteractionStage::Final, 1.5, &["forces"], &[]);
        b2.cl1 = 1;
        b2.cl2 = 1;
        manager.add(b2);

        assert_eq!(manager.largest_cell_list(0, InteractionStage::Final), Some(1));
        assert!((manager.max_effective_cutoff() - 1.5).abs() < 1e-6);
        assert_eq!(manager.largest_cell_list(0, InteractionStage::Intermediate), None);
    }

    #[test]
    fn test_extra_channel_queries() {
        let mut manager = InteractionManager::new();
        manager.add(binding(
            "den",
            0,
            0,
            InteractionStage::Intermediate,
            1.0,
            &["densities"],
            &[],
        ));
        assert_eq!(manager.extra_intermediate_channels(0), vec!["densities"]);
        assert!(manager.extra_intermediate_channels(1).is_empty());
    }
}
