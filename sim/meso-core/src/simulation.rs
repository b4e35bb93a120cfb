//! The simulation: registration, wiring and the scheduled time step.
//!
//! Handlers (particle vectors, interactions, integrators, bouncers, walls,
//! belonging checkers, plugins) are registered by name and bound with
//! `set_*` calls; `init` resolves the bindings into cell lists, channel
//! wiring, exchange engines and the compiled task graph; `run` advances
//! the clock.

use hashbrown::HashMap;
use meso_types::{CoordinatorConfig, DomainInfo, Real, Result, SimError, SimulationState};
use tracing::{debug, info};

use crate::belonging::{split_by_belonging, BelongingChecker};
use crate::bouncers::Bouncer;
use crate::celllist::{select_best, CellList};
use crate::checkpoint;
use crate::exchange::{
    ObjectHaloExchanger, ObjectRedistributor, ObjectReverseExchanger, ParticleHaloExchanger,
    ParticleRedistributor, SingleNodeEngine,
};
use crate::ic::{fill_object_tags, InitialConditions};
use crate::integrators::Integrator;
use crate::interactions::{
    Binding, Interaction, InteractionManager, InteractionStage,
};
use crate::plugin::{PluginHook, SimulationPlugin};
use crate::pvs::{validate_pv_name, AnyVector};
use crate::scheduler::{CompiledTask, TaskId, TaskScheduler};
use crate::walls::Wall;

const RC_TOLERANCE: Real = 1e-6;

/// One unit of scheduled work, executed by the simulation loop.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// Global checkpoint of everything.
    CheckpointAll,
    /// Checkpoint of a single vector.
    CheckpointPv(usize),
    /// Build one cell list.
    BuildCellList { pv: usize, cl: usize },
    /// Clear local intermediate channels of a vector.
    ClearIntermediate(usize),
    /// Clear local final channels of a vector.
    ClearFinal(usize),
    /// Clear halo intermediate channels of an object vector.
    ClearHaloIntermediate(usize),
    /// Clear halo final channels of an object vector.
    ClearHaloForces(usize),
    /// Run a plugin hook.
    Plugin { plugin: usize, hook: PluginHook },
    /// Pack-and-send of the intermediate particle halo.
    PartHaloIntermediateInit,
    /// Unpack of the intermediate particle halo.
    PartHaloIntermediateFinalize,
    /// Pack-and-send of the final particle halo.
    PartHaloFinalInit,
    /// Unpack of the final particle halo.
    PartHaloFinalFinalize,
    /// Local intermediate interactions (densities).
    LocalIntermediate,
    /// Halo intermediate interactions.
    HaloIntermediate,
    /// Fold intermediate outputs back to particle order.
    AccumulateIntermediate,
    /// Copy final-stage inputs into the cell lists.
    GatherIntermediate,
    /// Local final interactions (forces).
    LocalForces,
    /// Halo final interactions.
    HaloForces,
    /// Fold final outputs back to particle order.
    AccumulateFinal,
    /// Rebuild object halos (pre-force, with intermediate channels).
    ObjHaloIntermediate,
    /// Rebuild object halos (post-integration, for bouncing).
    ObjHaloFinal,
    /// Fold halo object forces and wrenches back to the owners.
    ObjReverseFinal,
    /// Advance one integrator binding.
    Integrate(usize),
    /// Bounce one bouncer binding off local objects.
    BounceLocal(usize),
    /// Bounce one bouncer binding off halo objects.
    BounceHalo(usize),
    /// Periodic belonging correction.
    CorrectBelonging(usize),
    /// Bounce a vector off a wall.
    WallBounce { wall: String, pv: usize },
    /// Periodic wall leak check.
    WallCheck(String),
    /// Pack-and-send of the particle redistribution.
    RedistributeInit,
    /// Unpack of the particle redistribution.
    RedistributeFinalize,
    /// Object redistribution (re-wrap).
    ObjRedistribute,
}

/// Task ids of the step graph, one per named task of the original layout.
#[derive(Debug, Clone)]
pub struct SimulationTasks {
    pub(crate) checkpoint: TaskId,
    pub(crate) cell_lists: TaskId,
    pub(crate) integration: TaskId,
    pub(crate) part_clear_intermediate: TaskId,
    pub(crate) part_halo_intermediate_init: TaskId,
    pub(crate) part_halo_intermediate_finalize: TaskId,
    pub(crate) local_intermediate: TaskId,
    pub(crate) halo_intermediate: TaskId,
    pub(crate) accumulate_intermediate: TaskId,
    pub(crate) gather_intermediate: TaskId,
    pub(crate) part_clear_final: TaskId,
    pub(crate) part_halo_final_init: TaskId,
    pub(crate) part_halo_final_finalize: TaskId,
    pub(crate) local_forces: TaskId,
    pub(crate) halo_forces: TaskId,
    pub(crate) accumulate_final: TaskId,
    pub(crate) obj_halo_final_init: TaskId,
    pub(crate) obj_halo_final_finalize: TaskId,
    pub(crate) obj_halo_intermediate_init: TaskId,
    pub(crate) obj_halo_intermediate_finalize: TaskId,
    pub(crate) obj_reverse_final_init: TaskId,
    pub(crate) obj_reverse_final_finalize: TaskId,
    pub(crate) obj_clear_local_intermediate: TaskId,
    pub(crate) obj_clear_halo_intermediate: TaskId,
    pub(crate) obj_clear_halo_forces: TaskId,
    pub(crate) obj_clear_local_forces: TaskId,
    pub(crate) obj_local_bounce: TaskId,
    pub(crate) obj_halo_bounce: TaskId,
    pub(crate) correct_obj_belonging: TaskId,
    pub(crate) wall_bounce: TaskId,
    pub(crate) wall_check: TaskId,
    pub(crate) part_redistribute_init: TaskId,
    pub(crate) part_redistribute_finalize: TaskId,
    pub(crate) obj_redist_init: TaskId,
    pub(crate) obj_redist_finalize: TaskId,
    pub(crate) plugins_before_cell_lists: TaskId,
    pub(crate) plugins_before_forces: TaskId,
    pub(crate) plugins_serialize_send: TaskId,
    pub(crate) plugins_before_integration: TaskId,
    pub(crate) plugins_after_integration: TaskId,
    pub(crate) plugins_before_particles_distribution: TaskId,
}

pub(crate) fn create_tasks(s: &mut TaskScheduler<WorkItem>) -> SimulationTasks {
    SimulationTasks {
        checkpoint: s.create_task("Checkpoint"),
        cell_lists: s.create_task("Build cell-lists"),
        integration: s.create_task("Integration"),
        part_clear_intermediate: s.create_task("Particle clear intermediate"),
        part_halo_intermediate_init: s.create_task("Particle halo intermediate init"),
        part_halo_intermediate_finalize: s.create_task("Particle halo intermediate finalize"),
        local_intermediate: s.create_task("Local intermediate"),
        halo_intermediate: s.create_task("Halo intermediate"),
        accumulate_intermediate: s.create_task("Accumulate intermediate"),
        gather_intermediate: s.create_task("Gather intermediate"),
        part_clear_final: s.create_task("Clear forces"),
        part_halo_final_init: s.create_task("Particle halo final init"),
        part_halo_final_finalize: s.create_task("Particle halo final finalize"),
        local_forces: s.create_task("Local forces"),
        halo_forces: s.create_task("Halo forces"),
        accumulate_final: s.create_task("Accumulate forces"),
        obj_halo_final_init: s.create_task("Object halo final init"),
        obj_halo_final_finalize: s.create_task("Object halo final finalize"),
        obj_halo_intermediate_init: s.create_task("Object halo intermediate init"),
        obj_halo_intermediate_finalize: s.create_task("Object halo intermediate finalize"),
        obj_reverse_final_init: s.create_task("Object reverse final: init"),
        obj_reverse_final_finalize: s.create_task("Object reverse final: finalize"),
        obj_clear_local_intermediate: s.create_task("Clear local object intermediate"),
        obj_clear_halo_intermediate: s.create_task("Clear halo object intermediate"),
        obj_clear_halo_forces: s.create_task("Clear object halo forces"),
        obj_clear_local_forces: s.create_task("Clear object local forces"),
        obj_local_bounce: s.create_task("Local object bounce"),
        obj_halo_bounce: s.create_task("Halo object bounce"),
        correct_obj_belonging: s.create_task("Correct object belonging"),
        wall_bounce: s.create_task("Wall bounce"),
        wall_check: s.create_task("Wall check"),
        part_redistribute_init: s.create_task("Particle redistribute init"),
        part_redistribute_finalize: s.create_task("Particle redistribute finalize"),
        obj_redist_init: s.create_task("Object redistribute init"),
        obj_redist_finalize: s.create_task("Object redistribute finalize"),
        plugins_before_cell_lists: s.create_task("Plugins: before cell lists"),
        plugins_before_forces: s.create_task("Plugins: before forces"),
        plugins_serialize_send: s.create_task("Plugins: serialize and send"),
        plugins_before_integration: s.create_task("Plugins: before integration"),
        plugins_after_integration: s.create_task("Plugins: after integration"),
        plugins_before_particles_distribution: s.create_task("Plugins: before particles distribution"),
    }
}

pub(crate) fn build_dependencies(s: &mut TaskScheduler<WorkItem>, t: &SimulationTasks) {
    s.add_dependency(t.plugins_before_cell_lists, &[t.cell_lists], &[]);

    s.add_dependency(t.checkpoint, &[t.part_clear_final], &[t.cell_lists]);

    s.add_dependency(t.correct_obj_belonging, &[t.cell_lists], &[]);

    s.add_dependency(
        t.cell_lists,
        &[
            t.part_clear_final,
            t.part_clear_intermediate,
            t.obj_clear_local_intermediate,
        ],
        &[],
    );

    s.add_dependency(
        t.plugins_before_forces,
        &[t.local_forces, t.halo_forces],
        &[t.part_clear_final],
    );
    s.add_dependency(
        t.plugins_serialize_send,
        &[t.plugins_before_integration, t.plugins_after_integration],
        &[t.plugins_before_forces, t.accumulate_final],
    );

    s.add_dependency(
        t.obj_clear_halo_forces,
        &[t.obj_halo_bounce],
        &[t.obj_halo_final_finalize],
    );

    s.add_dependency(t.obj_reverse_final_init, &[], &[t.halo_forces]);
    s.add_dependency(
        t.obj_reverse_final_finalize,
        &[t.accumulate_final],
        &[t.obj_reverse_final_init],
    );

    s.add_dependency(
        t.local_intermediate,
        &[],
        &[t.part_clear_intermediate, t.obj_clear_local_intermediate],
    );
    s.add_dependency(
        t.part_halo_intermediate_init,
        &[],
        &[t.part_clear_intermediate, t.cell_lists],
    );
    s.add_dependency(
        t.part_halo_intermediate_finalize,
        &[],
        &[t.part_halo_intermediate_init],
    );

    s.add_dependency(t.obj_clear_halo_intermediate, &[], &[t.cell_lists]);
    s.add_dependency(
        t.halo_intermediate,
        &[],
        &[t.part_halo_intermediate_finalize, t.obj_clear_halo_intermediate],
    );

    s.add_dependency(
        t.accumulate_intermediate,
        &[],
        &[t.local_intermediate, t.halo_intermediate],
    );
    s.add_dependency(t.gather_intermediate, &[], &[t.accumulate_intermediate]);

    s.add_dependency(t.local_forces, &[], &[t.gather_intermediate]);

    s.add_dependency(t.obj_halo_intermediate_init, &[], &[t.gather_intermediate]);
    s.add_dependency(
        t.obj_halo_intermediate_finalize,
        &[],
        &[t.obj_halo_intermediate_init],
    );

    s.add_dependency(
        t.part_halo_final_init,
        &[],
        &[t.plugins_before_forces, t.gather_intermediate],
    );
    s.add_dependency(t.part_halo_final_finalize, &[], &[t.part_halo_final_init]);

    s.add_dependency(
        t.halo_forces,
        &[],
        &[t.part_halo_final_finalize, t.obj_halo_intermediate_finalize],
    );
    s.add_dependency(
        t.accumulate_final,
        &[t.integration],
        &[t.halo_forces, t.local_forces],
    );

    s.add_dependency(
        t.plugins_before_integration,
        &[t.integration],
        &[t.accumulate_final],
    );
    s.add_dependency(t.wall_bounce, &[], &[t.integration]);
    s.add_dependency(t.wall_check, &[t.part_redistribute_init], &[t.wall_bounce]);

    s.add_dependency(
        t.obj_halo_final_init,
        &[],
        &[t.integration, t.obj_redist_finalize],
    );
    s.add_dependency(t.obj_halo_final_finalize, &[], &[t.obj_halo_final_init]);

    s.add_dependency(
        t.obj_local_bounce,
        &[],
        &[t.integration, t.obj_clear_local_forces],
    );
    s.add_dependency(
        t.obj_halo_bounce,
        &[],
        &[t.integration, t.obj_halo_final_finalize, t.obj_clear_halo_forces],
    );

    s.add_dependency(
        t.plugins_after_integration,
        &[],
        &[t.integration, t.wall_bounce, t.obj_local_bounce, t.obj_halo_bounce],
    );

    s.add_dependency(
        t.plugins_before_particles_distribution,
        &[],
        &[
            t.integration,
            t.wall_bounce,
            t.obj_local_bounce,
            t.obj_halo_bounce,
            t.plugins_after_integration,
        ],
    );
    s.add_dependency(
        t.part_redistribute_init,
        &[],
        &[t.plugins_before_particles_distribution],
    );
    s.add_dependency(t.part_redistribute_finalize, &[], &[t.part_redistribute_init]);

    s.add_dependency(
        t.obj_redist_init,
        &[],
        &[
            t.integration,
            t.wall_bounce,
            t.obj_reverse_final_finalize,
            t.plugins_after_integration,
        ],
    );
    s.add_dependency(t.obj_redist_finalize, &[], &[t.obj_redist_init]);
    s.add_dependency(
        t.obj_clear_local_forces,
        &[t.obj_local_bounce],
        &[t.integration],
    );

    s.set_high_priority(t.part_halo_intermediate_init);
    s.set_high_priority(t.part_halo_intermediate_finalize);
    s.set_high_priority(t.obj_halo_intermediate_init);
    s.set_high_priority(t.obj_halo_intermediate_finalize);
    s.set_high_priority(t.obj_clear_halo_intermediate);
    s.set_high_priority(t.obj_reverse_final_init);
    s.set_high_priority(t.obj_reverse_final_finalize);
    s.set_high_priority(t.halo_intermediate);
    s.set_high_priority(t.part_halo_final_init);
    s.set_high_priority(t.part_halo_final_finalize);
    s.set_high_priority(t.halo_forces);
    s.set_high_priority(t.plugins_serialize_send);
    s.set_high_priority(t.obj_clear_local_forces);
    s.set_high_priority(t.obj_local_bounce);
}

struct Engines {
    part_redistributor: SingleNodeEngine<ParticleRedistributor>,
    part_halo_intermediate: SingleNodeEngine<ParticleHaloExchanger>,
    part_halo_final: SingleNodeEngine<ParticleHaloExchanger>,
    obj_redistributor: ObjectRedistributor,
    obj_halo: ObjectHaloExchanger,
    obj_reverse: ObjectReverseExchanger,
}

struct BouncerBinding {
    bouncer: String,
    ov: usize,
    pv: usize,
}

struct SplitterBinding {
    checker: String,
    ov: usize,
    src: usize,
    inside: Option<usize>,
    outside: Option<usize>,
}

/// The simulation.
pub struct Simulation {
    state: SimulationState,
    domain: DomainInfo,
    config: CoordinatorConfig,

    pvs: Vec<AnyVector>,
    pv_ids: HashMap<String, usize>,

    interactions: HashMap<String, Box<dyn Interaction>>,
    integrators: HashMap<String, Box<dyn Integrator>>,
    bouncers: HashMap<String, Box<dyn Bouncer>>,
    walls: HashMap<String, Wall>,
    checkers: HashMap<String, Box<dyn BelongingChecker>>,
    checker_ov: HashMap<String, usize>,
    plugins: Vec<Option<Box<dyn SimulationPlugin>>>,

    interaction_prototypes: Vec<(String, usize, usize)>,
    integrator_bindings: Vec<(String, usize)>,
    pv_integrator: HashMap<usize, String>,
    bouncer_bindings: Vec<BouncerBinding>,
    wall_prototypes: Vec<(String, usize)>,
    wall_checks: Vec<(String, i64)>,
    splitters: Vec<SplitterBinding>,
    belonging_corrections: Vec<(usize, i64)>,
    pv_checkpoints: Vec<(usize, i64)>,

    cell_lists: Vec<Vec<CellList>>,
    manager: InteractionManager,
    scheduler: TaskScheduler<WorkItem>,
    tasks: Option<SimulationTasks>,
    plan: Vec<CompiledTask<WorkItem>>,
    engines: Option<Engines>,

    initialized: bool,
    restart_folder: Option<String>,
}

impl Simulation {
    /// Create an empty simulation from a validated configuration.
    ///
    /// # Errors
    ///
    /// Invalid configuration.
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        let domain = DomainInfo::single_rank(config.domain);
        let state = SimulationState::new(config.dt);
        info!(
            local_size = ?domain.local_size,
            global_start = ?domain.global_start,
            "simulation initialized"
        );
        Ok(Self {
            state,
            domain,
            config,
            pvs: Vec::new(),
            pv_ids: HashMap::new(),
            interactions: HashMap::new(),
            integrators: HashMap::new(),
            bouncers: HashMap::new(),
            walls: HashMap::new(),
            checkers: HashMap::new(),
            checker_ov: HashMap::new(),
            plugins: Vec::new(),
            interaction_prototypes: Vec::new(),
            integrator_bindings: Vec::new(),
            pv_integrator: HashMap::new(),
            bouncer_bindings: Vec::new(),
            wall_prototypes: Vec::new(),
            wall_checks: Vec::new(),
            splitters: Vec::new(),
            belonging_corrections: Vec::new(),
            pv_checkpoints: Vec::new(),
            cell_lists: Vec::new(),
            manager: InteractionManager::new(),
            scheduler: TaskScheduler::new(),
            tasks: None,
            plan: Vec::new(),
            engines: None,
            initialized: false,
            restart_folder: None,
        })
    }

    // ---------------------------------------------------------------- access

    /// Current simulation state.
    #[must_use]
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Domain geometry.
    #[must_use]
    pub fn domain(&self) -> &DomainInfo {
        &self.domain
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Number of registered vectors.
    #[must_use]
    pub fn n_pvs(&self) -> usize {
        self.pvs.len()
    }

    /// Index of a vector by name.
    ///
    /// # Errors
    ///
    /// Unknown name.
    pub fn pv_index(&self, name: &str) -> Result<usize> {
        self.pv_ids
            .get(name)
            .copied()
            .ok_or_else(|| SimError::not_found("particle vector", name))
    }

    /// Vector by index.
    #[must_use]
    pub fn pv(&self, idx: usize) -> &AnyVector {
        &self.pvs[idx]
    }

    /// Mutable vector by index.
    pub fn pv_mut(&mut self, idx: usize) -> &mut AnyVector {
        &mut self.pvs[idx]
    }

    /// Wall by name.
    ///
    /// # Errors
    ///
    /// Unknown name.
    pub fn wall(&self, name: &str) -> Result<&Wall> {
        self.walls
            .get(name)
            .ok_or_else(|| SimError::not_found("wall", name))
    }

    /// Largest interaction cutoff seen by the manager.
    #[must_use]
    pub fn max_effective_cutoff(&self) -> Real {
        self.manager.max_effective_cutoff()
    }

    // ---------------------------------------------------------- registration

    /// Register a particle vector with optional initial conditions.
    ///
    /// # Errors
    ///
    /// Invalid or duplicate names; IC failures; missing checkpoint in
    /// restart mode.
    pub fn register_particle_vector(
        &mut self,
        mut pv: AnyVector,
        ic: Option<&dyn InitialConditions>,
        checkpoint_every: i64,
    ) -> Result<usize> {
        let name = pv.name().to_owned();
        validate_pv_name(&name)?;
        if self.pv_ids.contains_key(&name) {
            return Err(SimError::duplicate("particle vector", name));
        }

        if let Some(folder) = self.restart_folder.clone() {
            checkpoint::restart_pv(&mut pv, &self.domain, &folder)?;
            fill_object_tags(&mut pv);
        } else if let Some(ic) = ic {
            ic.exec(&mut pv, &self.domain)?;
        }

        if pv.is_object() {
            info!(
                name = %name,
                objects = pv.pv().local.len() / pv.object_size().unwrap_or(1).max(1),
                particles = pv.pv().local.len(),
                "registered object vector"
            );
        } else {
            info!(name = %name, particles = pv.pv().local.len(), "registered particle vector");
        }

        let idx = self.pvs.len();
        self.pvs.push(pv);
        self.pv_ids.insert(name, idx);
        if checkpoint_every > 0 {
            self.pv_checkpoints.push((idx, checkpoint_every));
        }
        Ok(idx)
    }

    /// Register an interaction.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_interaction(&mut self, interaction: Box<dyn Interaction>) -> Result<()> {
        let name = interaction.name().to_owned();
        if self.interactions.contains_key(&name) {
            return Err(SimError::duplicate("interaction", name));
        }
        self.interactions.insert(name, interaction);
        Ok(())
    }

    /// Register an integrator.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_integrator(&mut self, integrator: Box<dyn Integrator>) -> Result<()> {
        let name = integrator.name().to_owned();
        if self.integrators.contains_key(&name) {
            return Err(SimError::duplicate("integrator", name));
        }
        self.integrators.insert(name, integrator);
        Ok(())
    }

    /// Register a bouncer.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_bouncer(&mut self, bouncer: Box<dyn Bouncer>) -> Result<()> {
        let name = bouncer.name().to_owned();
        if self.bouncers.contains_key(&name) {
            return Err(SimError::duplicate("bouncer", name));
        }
        self.bouncers.insert(name, bouncer);
        Ok(())
    }

    /// Register a wall; `check_every > 0` schedules periodic leak checks.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_wall(&mut self, wall: Wall, check_every: i64) -> Result<()> {
        let name = wall.name.clone();
        if self.walls.contains_key(&name) {
            return Err(SimError::duplicate("wall", name));
        }
        if check_every > 0 {
            self.wall_checks.push((name.clone(), check_every));
        }
        info!(wall = %name, "registered wall");
        self.walls.insert(name, wall);
        Ok(())
    }

    /// Register a belonging checker for an object vector.
    ///
    /// # Errors
    ///
    /// Duplicate name or unknown object vector.
    pub fn register_object_belonging_checker(
        &mut self,
        checker: Box<dyn BelongingChecker>,
        ov_name: &str,
    ) -> Result<()> {
        let name = checker.name().to_owned();
        if self.checkers.contains_key(&name) {
            return Err(SimError::duplicate("belonging checker", name));
        }
        let ov = self.pv_index(ov_name)?;
        if !self.pvs[ov].is_object() {
            return Err(SimError::not_found("object vector", ov_name));
        }
        self.checker_ov.insert(name.clone(), ov);
        self.checkers.insert(name, checker);
        Ok(())
    }

    /// Register a plugin.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_plugin(&mut self, plugin: Box<dyn SimulationPlugin>) -> Result<()> {
        let name = plugin.name().to_owned();
        if self
            .plugins
            .iter()
            .flatten()
            .any(|p| p.name() == name)
        {
            return Err(SimError::duplicate("plugin", name));
        }
        self.plugins.push(Some(plugin));
        Ok(())
    }

    // --------------------------------------------------------------- binding

    /// Bind an integrator to a vector; a vector may have only one.
    ///
    /// # Errors
    ///
    /// Unknown names or a vector that already has an integrator.
    pub fn set_integrator(&mut self, integrator_name: &str, pv_name: &str) -> Result<()> {
        if !self.integrators.contains_key(integrator_name) {
            return Err(SimError::not_found("integrator", integrator_name));
        }
        let pv = self.pv_index(pv_name)?;
        if let Some(existing) = self.pv_integrator.get(&pv) {
            return Err(SimError::invalid_config(format!(
                "particle vector '{pv_name}' already set to integrator '{existing}'"
            )));
        }
        self.pv_integrator.insert(pv, integrator_name.to_owned());
        if let Some(integrator) = self.integrators.get(integrator_name) {
            integrator.set_prerequisites(&mut self.pvs[pv]);
        }
        self.integrator_bindings
            .push((integrator_name.to_owned(), pv));
        Ok(())
    }

    /// Bind an interaction to a pair of vectors.
    ///
    /// # Errors
    ///
    /// Unknown names.
    pub fn set_interaction(
        &mut self,
        interaction_name: &str,
        pv1_name: &str,
        pv2_name: &str,
    ) -> Result<()> {
        if !self.interactions.contains_key(interaction_name) {
            return Err(SimError::not_found("interaction", interaction_name));
        }
        let pv1 = self.pv_index(pv1_name)?;
        let pv2 = self.pv_index(pv2_name)?;
        self.interaction_prototypes
            .push((interaction_name.to_owned(), pv1, pv2));
        Ok(())
    }

    /// Bind a bouncer: particles of `pv_name` bounce off objects of
    /// `ov_name`.
    ///
    /// # Errors
    ///
    /// Unknown names or a non-object `ov_name`.
    pub fn set_bouncer(&mut self, bouncer_name: &str, ov_name: &str, pv_name: &str) -> Result<()> {
        if !self.bouncers.contains_key(bouncer_name) {
            return Err(SimError::not_found("bouncer", bouncer_name));
        }
        let ov = self.pv_index(ov_name)?;
        if !self.pvs[ov].is_object() {
            return Err(SimError::not_found("object vector", ov_name));
        }
        let pv = self.pv_index(pv_name)?;
        self.bouncer_bindings.push(BouncerBinding {
            bouncer: bouncer_name.to_owned(),
            ov,
            pv,
        });
        Ok(())
    }

    /// Bind a wall: particles of `pv_name` bounce off it.
    ///
    /// # Errors
    ///
    /// Unknown names.
    pub fn set_wall_bounce(&mut self, wall_name: &str, pv_name: &str) -> Result<()> {
        if !self.walls.contains_key(wall_name) {
            return Err(SimError::not_found("wall", wall_name));
        }
        let pv = self.pv_index(pv_name)?;
        self.wall_prototypes.push((wall_name.to_owned(), pv));
        Ok(())
    }

    /// Split a vector by object belonging. Exactly one of `inside` /
    /// `outside` must name a destination; `"none"` drops that side, an
    /// empty string keeps it in the source. Returns the index of the newly
    /// created vector, if any.
    ///
    /// # Errors
    ///
    /// Contradictory split requests, unknown names.
    pub fn apply_object_belonging_checker(
        &mut self,
        checker_name: &str,
        source: &str,
        inside: &str,
        outside: &str,
        correct_every: i64,
        checkpoint_every: i64,
    ) -> Result<Option<usize>> {
        let src = self.pv_index(source)?;
        if inside == outside {
            return Err(SimError::InvalidSplit {
                source_pv: source.to_owned(),
                inside: inside.to_owned(),
                outside: outside.to_owned(),
                reason: "exactly one of inside/outside must be specified",
            });
        }
        if !inside.is_empty() && !outside.is_empty() {
            return Err(SimError::InvalidSplit {
                source_pv: source.to_owned(),
                inside: inside.to_owned(),
                outside: outside.to_owned(),
                reason: "at least one of the split destinations must stay the source",
            });
        }
        if !self.checkers.contains_key(checker_name) {
            return Err(SimError::not_found("belonging checker", checker_name));
        }

        let mass = self.pvs[src].mass();
        let mut resolve = |desc: &str, this: &mut Self| -> Result<(Option<usize>, bool)> {
            // "" keeps the source, "none" drops the side, anything else
            // creates a fresh vector.
            match desc {
                "" => Ok((Some(src), false)),
                "none" => Ok((None, false)),
                name => {
                    if this.pv_ids.contains_key(name) {
                        return Err(SimError::InvalidSplit {
                            source_pv: source.to_owned(),
                            inside: inside.to_owned(),
                            outside: outside.to_owned(),
                            reason: "cannot split into an existing particle vector",
                        });
                    }
                    let idx = this.register_particle_vector(
                        AnyVector::Plain(crate::pvs::ParticleVector::new(name, mass)),
                        None,
                        checkpoint_every,
                    )?;
                    Ok((Some(idx), true))
                }
            }
        };

        let (inside_idx, inside_new) = resolve(inside, self)?;
        let (outside_idx, outside_new) = resolve(outside, self)?;

        let ov = *self
            .checker_ov
            .get(checker_name)
            .ok_or_else(|| SimError::not_found("belonging checker", checker_name))?;

        self.splitters.push(SplitterBinding {
            checker: checker_name.to_owned(),
            ov,
            src,
            inside: inside_idx,
            outside: outside_idx,
        });
        if correct_every > 0 {
            self.belonging_corrections
                .push((self.splitters.len() - 1, correct_every));
        }

        Ok(match (inside_new, outside_new) {
            (true, _) => inside_idx,
            (_, true) => outside_idx,
            _ => None,
        })
    }

    /// Enter restart mode: handlers registered from now on restore their
    /// state from `folder`, and `restart` replays the clock.
    pub fn set_restart_folder(&mut self, folder: &str) {
        self.restart_folder = Some(folder.to_owned());
    }

    // ------------------------------------------------------------------ init

    fn prepare_cell_lists(&mut self) {
        info!("preparing cell-lists");
        let mut cutoffs: Vec<Vec<Real>> = vec![Vec::new(); self.pvs.len()];
        for (name, pv1, pv2) in &self.interaction_prototypes {
            if let Some(interaction) = self.interactions.get(name) {
                cutoffs[*pv1].push(interaction.rc());
                cutoffs[*pv2].push(interaction.rc());
            }
        }

        self.cell_lists = Vec::with_capacity(self.pvs.len());
        for (idx, pv) in self.pvs.iter().enumerate() {
            let mut rcs = cutoffs[idx].clone();
            if rcs.is_empty() && self.wall_prototypes.iter().any(|(_, p)| *p == idx) {
                rcs.push(1.0);
            }
            rcs.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            rcs.dedup_by(|a, b| (*a - *b).abs() < RC_TOLERANCE);

            let mut lists = Vec::new();
            let mut primary = !pv.is_object();
            for rc in rcs {
                lists.push(CellList::new(rc, self.domain.local_size, primary));
                primary = false;
            }
            if lists.is_empty() {
                lists.push(CellList::new(1.0, self.domain.local_size, !pv.is_object()));
            }
            self.cell_lists.push(lists);
        }
    }

    fn prepare_interactions(&mut self) -> Result<()> {
        info!("preparing interactions");
        for (name, pv1, pv2) in &self.interaction_prototypes {
            let interaction = self
                .interactions
                .get(name)
                .ok_or_else(|| SimError::not_found("interaction", name))?;
            let rc = interaction.rc();
            let cl1 = select_best(&self.cell_lists[*pv1], rc, RC_TOLERANCE).ok_or_else(|| {
                SimError::invalid_config(format!(
                    "no cell list covers cutoff {rc} for '{}'",
                    self.pvs[*pv1].name()
                ))
            })?;
            let cl2 = select_best(&self.cell_lists[*pv2], rc, RC_TOLERANCE).ok_or_else(|| {
                SimError::invalid_config(format!(
                    "no cell list covers cutoff {rc} for '{}'",
                    self.pvs[*pv2].name()
                ))
            })?;
            self.manager.add(Binding {
                interaction: name.clone(),
                pv1: *pv1,
                pv2: *pv2,
                cl1,
                cl2,
                stage: interaction.stage(),
                rc,
                outputs: interaction.output_channels(),
                inputs: interaction.input_channels(),
            });
        }
        self.manager.prepare_channels(&mut self.pvs, &mut self.cell_lists);
        self.manager.check(&self.pvs)?;
        Ok(())
    }

    fn prepare_bouncers(&self) -> Result<()> {
        info!("preparing object bouncers");
        for binding in &self.bouncer_bindings {
            if !self.pv_integrator.contains_key(&binding.pv) {
                return Err(SimError::invalid_config(format!(
                    "setting bouncer '{}': particle vector '{}' has no integrator, required \
                     for bounce back",
                    binding.bouncer,
                    self.pvs[binding.pv].name()
                )));
            }
        }
        Ok(())
    }

    fn prepare_walls(&mut self) {
        info!("preparing walls");
        for (wall_name, pv) in &self.wall_prototypes {
            if let Some(wall) = self.walls.get_mut(wall_name) {
                wall.attach(*pv);
            }
        }
        // All particles inside any wall are removed, even of vectors that
        // do not interact with it; only frozen wall particles remain.
        for wall in self.walls.values() {
            for (idx, pv) in self.pvs.iter_mut().enumerate() {
                // Vectors without an integrator are frozen layers; they
                // live inside the walls on purpose.
                if !self.pv_integrator.contains_key(&idx) {
                    continue;
                }
                let removed = wall.remove_inner(&mut pv.pv_mut().local, &self.domain);
                if removed > 0 {
                    debug!(wall = %wall.name, pv = %pv.name(), removed, "removed inner particles");
                }
            }
        }
    }

    fn prepare_plugins(&mut self) -> Result<()> {
        info!("preparing plugins");
        for i in 0..self.plugins.len() {
            if let Some(mut plugin) = self.plugins[i].take() {
                debug!(plugin = %plugin.name(), "setup of plugin");
                let result = plugin.setup(self);
                self.plugins[i] = Some(plugin);
                result?;
            }
        }
        Ok(())
    }

    fn prepare_engines(&mut self) {
        let mut part_redist = ParticleRedistributor::new();
        let mut part_halo_intermediate = ParticleHaloExchanger::new();
        let mut part_halo_final = ParticleHaloExchanger::new();
        let mut obj_redist = ObjectRedistributor::new();
        let mut obj_halo = ObjectHaloExchanger::new();
        let mut obj_reverse = ObjectReverseExchanger::new();

        debug!("attaching particle vectors to halo exchanger and redistributor");
        for idx in 0..self.pvs.len() {
            if self.cell_lists[idx].is_empty() {
                continue;
            }
            let cl_int = self.manager.largest_cell_list(idx, InteractionStage::Intermediate);
            let cl_fin = self.manager.largest_cell_list(idx, InteractionStage::Final);
            let extra_int = self.manager.extra_intermediate_channels(idx);
            let extra_fin = self.manager.extra_final_channels(idx);

            if self.pvs[idx].is_object() {
                obj_redist.attach(idx);

                let rc = self.cell_lists[idx][0].grid.rc;
                let mut channels: Vec<String> = extra_int.clone();
                // Object tags travel with the halo so object-aware kernels
                // recognize periodic images of their own object.
                channels.push("object_tags".to_owned());
                for binding in &self.bouncer_bindings {
                    if binding.ov == idx {
                        if let Some(bouncer) = self.bouncers.get(&binding.bouncer) {
                            channels.extend(bouncer.channels_to_exchange());
                        }
                    }
                }
                for (checker, ov) in &self.checker_ov {
                    if *ov == idx {
                        if let Some(c) = self.checkers.get(checker) {
                            channels.extend(c.channels_to_exchange());
                        }
                    }
                }
                channels.sort();
                channels.dedup();
                obj_halo.attach(idx, rc, channels);
                obj_reverse.attach(idx, extra_fin);
            } else {
                part_redist.attach(idx, &self.pvs);
                if let Some(cl) = cl_int {
                    let rc = self.cell_lists[idx][cl].grid.rc;
                    part_halo_intermediate.attach(idx, rc, Vec::new());
                }
                if let Some(cl) = cl_fin {
                    let rc = self.cell_lists[idx][cl].grid.rc;
                    part_halo_final.attach(idx, rc, extra_int);
                }
            }
        }

        self.engines = Some(Engines {
            part_redistributor: SingleNodeEngine::new(part_redist),
            part_halo_intermediate: SingleNodeEngine::new(part_halo_intermediate),
            part_halo_final: SingleNodeEngine::new(part_halo_final),
            obj_redistributor: obj_redist,
            obj_halo,
            obj_reverse,
        });
    }

    #[allow(clippy::too_many_lines)]
    fn create_task_items(&mut self, tasks: &SimulationTasks) {
        let s = &mut self.scheduler;

        if self.config.checkpoint_every > 0 {
            s.add_item(tasks.checkpoint, WorkItem::CheckpointAll, self.config.checkpoint_every);
        } else {
            for (pv, every) in &self.pv_checkpoints {
                info!(
                    pv = %self.pvs[*pv].name(),
                    every,
                    "will save checkpoint of particle vector"
                );
                s.add_item(tasks.checkpoint, WorkItem::CheckpointPv(*pv), *every);
            }
        }

        for (pv, lists) in self.cell_lists.iter().enumerate() {
            for cl in 0..lists.len() {
                s.add_item(tasks.cell_lists, WorkItem::BuildCellList { pv, cl }, 1);
            }
        }

        let has_objects = self.pvs.iter().any(AnyVector::is_object);
        let has_loose = self.pvs.iter().any(|pv| !pv.is_object());

        for pv in 0..self.pvs.len() {
            s.add_item(tasks.part_clear_intermediate, WorkItem::ClearIntermediate(pv), 1);
            s.add_item(tasks.part_clear_final, WorkItem::ClearFinal(pv), 1);
            if self.pvs[pv].is_object() {
                s.add_item(
                    tasks.obj_clear_halo_intermediate,
                    WorkItem::ClearHaloIntermediate(pv),
                    1,
                );
                s.add_item(tasks.obj_clear_halo_forces, WorkItem::ClearHaloForces(pv), 1);
            }
        }

        for plugin in 0..self.plugins.len() {
            let hooks = [
                (tasks.plugins_before_cell_lists, PluginHook::BeforeCellLists),
                (tasks.plugins_before_forces, PluginHook::BeforeForces),
                (tasks.plugins_serialize_send, PluginHook::SerializeSend),
                (tasks.plugins_before_integration, PluginHook::BeforeIntegration),
                (tasks.plugins_after_integration, PluginHook::AfterIntegration),
                (
                    tasks.plugins_before_particles_distribution,
                    PluginHook::BeforeParticleDistribution,
                ),
            ];
            for (task, hook) in hooks {
                s.add_item(task, WorkItem::Plugin { plugin, hook }, 1);
            }
        }

        if has_loose {
            if self.manager.has_intermediate() {
                s.add_item(
                    tasks.part_halo_intermediate_init,
                    WorkItem::PartHaloIntermediateInit,
                    1,
                );
                s.add_item(
                    tasks.part_halo_intermediate_finalize,
                    WorkItem::PartHaloIntermediateFinalize,
                    1,
                );
            }
            s.add_item(tasks.part_halo_final_init, WorkItem::PartHaloFinalInit, 1);
            s.add_item(tasks.part_halo_final_finalize, WorkItem::PartHaloFinalFinalize, 1);
            s.add_item(tasks.part_redistribute_init, WorkItem::RedistributeInit, 1);
            s.add_item(
                tasks.part_redistribute_finalize,
                WorkItem::RedistributeFinalize,
                1,
            );
        }

        if self.manager.has_intermediate() {
            s.add_item(tasks.local_intermediate, WorkItem::LocalIntermediate, 1);
            s.add_item(tasks.halo_intermediate, WorkItem::HaloIntermediate, 1);
            s.add_item(
                tasks.accumulate_intermediate,
                WorkItem::AccumulateIntermediate,
                1,
            );
        }
        s.add_item(tasks.gather_intermediate, WorkItem::GatherIntermediate, 1);
        s.add_item(tasks.local_forces, WorkItem::LocalForces, 1);
        s.add_item(tasks.halo_forces, WorkItem::HaloForces, 1);
        s.add_item(tasks.accumulate_final, WorkItem::AccumulateFinal, 1);

        for (idx, _) in self.integrator_bindings.iter().enumerate() {
            s.add_item(tasks.integration, WorkItem::Integrate(idx), 1);
        }

        if has_objects {
            s.add_item(tasks.obj_halo_intermediate_init, WorkItem::ObjHaloIntermediate, 1);
            s.add_item(tasks.obj_halo_final_init, WorkItem::ObjHaloFinal, 1);
            s.add_item(tasks.obj_reverse_final_init, WorkItem::ObjReverseFinal, 1);
            s.add_item(tasks.obj_redist_init, WorkItem::ObjRedistribute, 1);
        }

        for (idx, _) in self.bouncer_bindings.iter().enumerate() {
            s.add_item(tasks.obj_local_bounce, WorkItem::BounceLocal(idx), 1);
            s.add_item(tasks.obj_halo_bounce, WorkItem::BounceHalo(idx), 1);
        }

        for (splitter, every) in &self.belonging_corrections {
            s.add_item(
                tasks.correct_obj_belonging,
                WorkItem::CorrectBelonging(*splitter),
                *every,
            );
        }

        for (wall, pv) in &self.wall_prototypes {
            s.add_item(
                tasks.wall_bounce,
                WorkItem::WallBounce {
                    wall: wall.clone(),
                    pv: *pv,
                },
                1,
            );
        }
        for (wall, every) in &self.wall_checks {
            s.add_item(tasks.wall_check, WorkItem::WallCheck(wall.clone()), *every);
        }
    }

    /// Resolve all registrations into the executable step.
    ///
    /// # Errors
    ///
    /// Any wiring problem: missing producers, bouncers without
    /// integrators, task graph cycles.
    pub fn init(&mut self) -> Result<()> {
        info!("simulation initiated");
        self.prepare_cell_lists();
        self.prepare_interactions()?;
        self.prepare_bouncers()?;
        self.prepare_walls();
        self.prepare_plugins()?;
        self.prepare_engines();

        info!(dt = self.state.dt, "time-step is set");

        self.scheduler = TaskScheduler::new();
        let tasks = create_tasks(&mut self.scheduler);
        self.create_task_items(&tasks);
        build_dependencies(&mut self.scheduler, &tasks);
        self.scheduler.compile()?;
        self.plan = self.scheduler.plan();
        self.tasks = Some(tasks);

        // Initial preparation: build cell lists and halos once so the first
        // step sees consistent neighborhood data, then run the splitters.
        for item in self.plan.clone() {
            for entry in &item.entries {
                if matches!(entry.item, WorkItem::BuildCellList { .. }) {
                    self.exec_item(&entry.item)?;
                }
            }
        }
        self.exec_item(&WorkItem::ObjHaloFinal)?;
        for idx in 0..self.splitters.len() {
            self.exec_splitter(idx)?;
        }

        self.initialized = true;
        Ok(())
    }

    fn exec_splitter(&mut self, idx: usize) -> Result<()> {
        let checker_name = self.splitters[idx].checker.clone();
        let (ov, src, inside, outside) = {
            let s = &self.splitters[idx];
            (s.ov, s.src, s.inside, s.outside)
        };
        let checker = self
            .checkers
            .get(&checker_name)
            .ok_or_else(|| SimError::not_found("belonging checker", &checker_name))?;
        info!(
            src = %self.pvs[src].name(),
            "splitting particle vector with respect to object belonging"
        );
        split_by_belonging(checker.as_ref(), &mut self.pvs, ov, src, inside, outside)?;
        for target in [inside, outside].into_iter().flatten() {
            fill_object_tags(&mut self.pvs[target]);
        }
        Ok(())
    }

    // ------------------------------------------------------------- execution

    fn run_plugin_hook(&mut self, plugin: usize, hook: PluginHook) -> Result<()> {
        let Some(mut p) = self.plugins[plugin].take() else {
            return Ok(());
        };
        let result = match hook {
            PluginHook::BeforeCellLists => p.before_cell_lists(self),
            PluginHook::BeforeForces => p.before_forces(self),
            PluginHook::SerializeSend => p.serialize_and_send(self),
            PluginHook::BeforeIntegration => p.before_integration(self),
            PluginHook::AfterIntegration => p.after_integration(self),
            PluginHook::BeforeParticleDistribution => p.before_particle_distribution(self),
        };
        self.plugins[plugin] = Some(p);
        result
    }

    #[allow(clippy::too_many_lines)]
    fn exec_item(&mut self, item: &WorkItem) -> Result<()> {
        let t = self.state.t;
        match item {
            WorkItem::CheckpointAll => self.checkpoint()?,
            WorkItem::CheckpointPv(pv) => {
                checkpoint::checkpoint_pv(
                    &self.pvs[*pv],
                    &self.domain,
                    &self.config.checkpoint_folder,
                )?;
            }
            WorkItem::BuildCellList { pv, cl } => {
                let list = &mut self.cell_lists[*pv][*cl];
                list.build(&mut self.pvs[*pv].pv_mut().local);
            }
            WorkItem::ClearIntermediate(pv) => {
                self.manager.clear_stage_local(
                    *pv,
                    InteractionStage::Intermediate,
                    t,
                    &mut self.pvs,
                    &mut self.cell_lists,
                );
            }
            WorkItem::ClearFinal(pv) => {
                self.manager.clear_stage_local(
                    *pv,
                    InteractionStage::Final,
                    t,
                    &mut self.pvs,
                    &mut self.cell_lists,
                );
            }
            WorkItem::ClearHaloIntermediate(pv) => {
                self.manager
                    .clear_stage_halo(*pv, InteractionStage::Intermediate, t, &mut self.pvs);
            }
            WorkItem::ClearHaloForces(pv) => {
                self.manager
                    .clear_stage_halo(*pv, InteractionStage::Final, t, &mut self.pvs);
            }
            WorkItem::Plugin { plugin, hook } => self.run_plugin_hook(*plugin, *hook)?,
            WorkItem::PartHaloIntermediateInit => {
                if let Some(engines) = self.engines.as_mut() {
                    engines
                        .part_halo_intermediate
                        .init(&mut self.pvs, &self.domain)?;
                }
            }
            WorkItem::PartHaloIntermediateFinalize => {
                if let Some(engines) = self.engines.as_mut() {
                    engines
                        .part_halo_intermediate
                        .finalize(&mut self.pvs, &self.domain)?;
                }
            }
            WorkItem::PartHaloFinalInit => {
                if let Some(engines) = self.engines.as_mut() {
                    engines.part_halo_final.init(&mut self.pvs, &self.domain)?;
                }
            }
            WorkItem::PartHaloFinalFinalize => {
                if let Some(engines) = self.engines.as_mut() {
                    engines
                        .part_halo_final
                        .finalize(&mut self.pvs, &self.domain)?;
                }
            }
            WorkItem::LocalIntermediate => {
                self.manager.execute(
                    InteractionStage::Intermediate,
                    false,
                    &self.state,
                    &mut self.pvs,
                    &mut self.cell_lists,
                    &mut self.interactions,
                )?;
            }
            WorkItem::HaloIntermediate => {
                self.manager.execute(
                    InteractionStage::Intermediate,
                    true,
                    &self.state,
                    &mut self.pvs,
                    &mut self.cell_lists,
                    &mut self.interactions,
                )?;
            }
            WorkItem::AccumulateIntermediate => {
                self.manager.accumulate_stage(
                    InteractionStage::Intermediate,
                    t,
                    &mut self.pvs,
                    &mut self.cell_lists,
                );
            }
            WorkItem::GatherIntermediate => {
                self.manager
                    .gather_inputs(t, &mut self.pvs, &mut self.cell_lists);
            }
            WorkItem::LocalForces => {
                self.manager.execute(
                    InteractionStage::Final,
                    false,
                    &self.state,
                    &mut self.pvs,
                    &mut self.cell_lists,
                    &mut self.interactions,
                )?;
            }
            WorkItem::HaloForces => {
                self.manager.execute(
                    InteractionStage::Final,
                    true,
                    &self.state,
                    &mut self.pvs,
                    &mut self.cell_lists,
                    &mut self.interactions,
                )?;
            }
            WorkItem::AccumulateFinal => {
                self.manager.accumulate_stage(
                    InteractionStage::Final,
                    t,
                    &mut self.pvs,
                    &mut self.cell_lists,
                );
            }
            WorkItem::ObjHaloIntermediate | WorkItem::ObjHaloFinal => {
                if let Some(engines) = self.engines.as_mut() {
                    engines.obj_halo.exchange(&mut self.pvs, &self.domain)?;
                }
            }
            WorkItem::ObjReverseFinal => {
                if let Some(engines) = self.engines.as_mut() {
                    engines.obj_reverse.exchange(&mut self.pvs)?;
                }
            }
            WorkItem::Integrate(idx) => {
                let (name, pv) = &self.integrator_bindings[*idx];
                let integrator = self
                    .integrators
                    .get_mut(name)
                    .ok_or_else(|| SimError::not_found("integrator", name))?;
                integrator.stage2(&self.state, &self.domain, &mut self.pvs[*pv])?;
            }
            WorkItem::BounceLocal(idx) | WorkItem::BounceHalo(idx) => {
                let halo = matches!(item, WorkItem::BounceHalo(_));
                let BouncerBinding { bouncer, ov, pv } = &self.bouncer_bindings[*idx];
                let bouncer = self
                    .bouncers
                    .get_mut(bouncer)
                    .ok_or_else(|| SimError::not_found("bouncer", bouncer))?;
                let cl = self.cell_lists[*pv].first().ok_or_else(|| {
                    SimError::invalid_config("bounced particle vector has no cell list")
                })?;
                let (ov_ref, pv_ref) = crate::interactions::pair_mut(&mut self.pvs, *ov, *pv);
                bouncer.bounce(&self.state, ov_ref, pv_ref, cl, halo)?;
            }
            WorkItem::CorrectBelonging(idx) => self.exec_splitter(*idx)?,
            WorkItem::WallBounce { wall, pv } => {
                let wall = self
                    .walls
                    .get(wall)
                    .ok_or_else(|| SimError::not_found("wall", wall))?;
                wall.bounce(&mut self.pvs[*pv], &self.domain);
            }
            WorkItem::WallCheck(wall) => {
                let wall = self
                    .walls
                    .get(wall)
                    .ok_or_else(|| SimError::not_found("wall", wall))?;
                for &(_, pv) in self.wall_prototypes.iter().filter(|(w, _)| w == &wall.name) {
                    let _ = wall.check(&self.pvs[pv], &self.domain);
                }
            }
            WorkItem::RedistributeInit => {
                if let Some(engines) = self.engines.as_mut() {
                    engines
                        .part_redistributor
                        .init(&mut self.pvs, &self.domain)?;
                }
            }
            WorkItem::RedistributeFinalize => {
                if let Some(engines) = self.engines.as_mut() {
                    engines
                        .part_redistributor
                        .finalize(&mut self.pvs, &self.domain)?;
                }
            }
            WorkItem::ObjRedistribute => {
                if let Some(engines) = self.engines.as_mut() {
                    engines
                        .obj_redistributor
                        .exchange(&mut self.pvs, &self.domain)?;
                }
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        debug!(step = self.state.step, t = self.state.t, "timestep");

        for interaction in self.interactions.values_mut() {
            interaction.setup(&self.state);
        }

        let plan = std::mem::take(&mut self.plan);
        let mut result = Ok(());
        'outer: for task in &plan {
            for entry in &task.entries {
                if self.state.step % entry.every == 0 {
                    if let Err(e) = self.exec_item(&entry.item) {
                        result = Err(e);
                        break 'outer;
                    }
                }
            }
        }
        self.plan = plan;
        result?;

        self.state.advance();
        Ok(())
    }

    /// Run the simulation for `nsteps` steps, initializing on first call.
    ///
    /// # Errors
    ///
    /// Initialization or execution failures.
    pub fn run(&mut self, nsteps: i64) -> Result<()> {
        if !self.initialized {
            self.init()?;
        }
        info!(nsteps, "will run iterations now");

        for _ in 0..nsteps {
            self.step()?;
        }

        // Finish the redistribution by rebuilding the cell lists.
        let plan = std::mem::take(&mut self.plan);
        for task in &plan {
            for entry in &task.entries {
                if matches!(entry.item, WorkItem::BuildCellList { .. }) {
                    self.exec_item(&entry.item)?;
                }
            }
        }
        self.plan = plan;

        info!(nsteps, "finished with iterations");
        for i in 0..self.plugins.len() {
            if let Some(mut plugin) = self.plugins[i].take() {
                let result = plugin.finalize(self);
                self.plugins[i] = Some(plugin);
                result?;
            }
        }
        Ok(())
    }

    // --------------------------------------------------------- persistence

    /// Write a full checkpoint of the simulation.
    ///
    /// # Errors
    ///
    /// I/O failures.
    pub fn checkpoint(&self) -> Result<()> {
        let folder = &self.config.checkpoint_folder;
        checkpoint::write_sim_state(folder, self.state.t, self.state.step)?;
        info!(folder = %folder, "writing simulation state");
        for pv in &self.pvs {
            checkpoint::checkpoint_pv(pv, &self.domain, folder)?;
        }
        for plugin in self.plugins.iter().flatten() {
            plugin.checkpoint(folder)?;
        }
        Ok(())
    }

    /// Restore the simulation clock and every registered handler from a
    /// checkpoint folder.
    ///
    /// # Errors
    ///
    /// A missing checkpoint file of any registered component.
    pub fn restart(&mut self, folder: &str) -> Result<()> {
        let (t, step) = checkpoint::read_sim_state(folder)?;
        self.state.t = t;
        self.state.step = step;
        self.restart_folder = Some(folder.to_owned());
        info!(folder = %folder, "reading simulation state");

        for pv in &mut self.pvs {
            checkpoint::restart_pv(pv, &self.domain, folder)?;
            fill_object_tags(pv);
        }
        for i in 0..self.plugins.len() {
            if let Some(mut plugin) = self.plugins[i].take() {
                let result = plugin.restart(folder);
                self.plugins[i] = Some(plugin);
                result?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------- graphs

    /// Export the task dependency graph as GraphML into `<fname>.graphml`.
    ///
    /// With `current = true` the compiled graph of this simulation is
    /// exported (only meaningful after `run`); otherwise the full static
    /// task graph is built on a scratch scheduler and exported.
    ///
    /// # Errors
    ///
    /// I/O failures, or `current = true` before initialization.
    pub fn save_dependency_graph_graphml(&self, fname: &str, current: bool) -> Result<()> {
        if current {
            if !self.initialized {
                return Err(SimError::invalid_config(
                    "the current task graph exists only after run()",
                ));
            }
            return self.scheduler.save_dependency_graph_graphml(fname, true);
        }
        let mut scratch: TaskScheduler<WorkItem> = TaskScheduler::new();
        let tasks = create_tasks(&mut scratch);
        build_dependencies(&mut scratch, &tasks);
        scratch.save_dependency_graph_graphml(fname, false)
    }
}
