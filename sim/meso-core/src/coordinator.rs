//! The user-facing coordination object.
//!
//! One coordinator should exist at a time. It owns the [`Simulation`],
//! initializes logging from the configured debug level, creates the
//! checkpoint folder, and adds the operations that run auxiliary
//! simulations (frozen wall and rigid particle generation) or query the
//! wall geometry.

use meso_types::{CoordinatorConfig, Real, Result, SimulationState, Vector3};
use tracing::info;

use crate::belonging::{BelongingChecker, BelongingTag};
use crate::bouncers::Bouncer;
use crate::ic::{InitialConditions, UniformIc};
use crate::integrators::Integrator;
use crate::interactions::Interaction;
use crate::logging::init_logging;
use crate::plugin::SimulationPlugin;
use crate::pvs::{AnyVector, ParticleVector};
use crate::simulation::Simulation;
use crate::walls::{
    compute_volume_inside_walls, dump_walls_sdf, freeze_particles_near_walls, Wall,
};

/// Main coordination class.
pub struct Coordinator {
    sim: Simulation,
}

impl Coordinator {
    /// Create the coordinator: validate the configuration, set up logging
    /// and the checkpoint folder.
    ///
    /// # Errors
    ///
    /// Invalid configuration or I/O failures.
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        init_logging(&config.log_target(), config.debug_level)?;
        let sim = Simulation::new(config)?;
        Ok(Self { sim })
    }

    /// The wrapped simulation (plugin hooks receive the same object).
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Mutable access to the wrapped simulation.
    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    /// Current simulation state.
    #[must_use]
    pub fn state(&self) -> SimulationState {
        *self.sim.state()
    }

    /// Whether this rank computes; always true in the single-node build.
    #[must_use]
    pub fn is_compute_task(&self) -> bool {
        true
    }

    /// Whether this is the first rank; always true in the single-node
    /// build.
    #[must_use]
    pub fn is_master_task(&self) -> bool {
        true
    }

    // ---------------------------------------------------------- registration

    /// Register a particle vector with optional initial conditions.
    ///
    /// # Errors
    ///
    /// See [`Simulation::register_particle_vector`].
    pub fn register_particle_vector(
        &mut self,
        pv: AnyVector,
        ic: Option<&dyn InitialConditions>,
        checkpoint_every: i64,
    ) -> Result<usize> {
        self.sim.register_particle_vector(pv, ic, checkpoint_every)
    }

    /// Register an interaction.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_interaction(&mut self, interaction: Box<dyn Interaction>) -> Result<()> {
        self.sim.register_interaction(interaction)
    }

    /// Register an integrator.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_integrator(&mut self, integrator: Box<dyn Integrator>) -> Result<()> {
        self.sim.register_integrator(integrator)
    }

    /// Register an object bouncer.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_bouncer(&mut self, bouncer: Box<dyn Bouncer>) -> Result<()> {
        self.sim.register_bouncer(bouncer)
    }

    /// Register a wall; `check_every > 0` schedules periodic leak checks.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_wall(&mut self, wall: Wall, check_every: i64) -> Result<()> {
        self.sim.register_wall(wall, check_every)
    }

    /// Register an object belonging checker for the given object vector.
    ///
    /// # Errors
    ///
    /// Duplicate name or unknown object vector.
    pub fn register_object_belonging_checker(
        &mut self,
        checker: Box<dyn BelongingChecker>,
        ov_name: &str,
    ) -> Result<()> {
        self.sim.register_object_belonging_checker(checker, ov_name)
    }

    /// Register a plugin.
    ///
    /// # Errors
    ///
    /// Duplicate name.
    pub fn register_plugin(&mut self, plugin: Box<dyn SimulationPlugin>) -> Result<()> {
        self.sim.register_plugin(plugin)
    }

    // --------------------------------------------------------------- binding

    /// Set an integrator on a particle vector.
    ///
    /// # Errors
    ///
    /// See [`Simulation::set_integrator`].
    pub fn set_integrator(&mut self, integrator: &str, pv: &str) -> Result<()> {
        self.sim.set_integrator(integrator, pv)
    }

    /// Forces between two particle vectors (which may be the same) will be
    /// computed according to the given interaction.
    ///
    /// # Errors
    ///
    /// See [`Simulation::set_interaction`].
    pub fn set_interaction(&mut self, interaction: &str, pv1: &str, pv2: &str) -> Result<()> {
        self.sim.set_interaction(interaction, pv1, pv2)
    }

    /// Set a bouncer between an object vector and a particle vector.
    ///
    /// # Errors
    ///
    /// See [`Simulation::set_bouncer`].
    pub fn set_bouncer(&mut self, bouncer: &str, ov: &str, pv: &str) -> Result<()> {
        self.sim.set_bouncer(bouncer, ov, pv)
    }

    /// Set wall bouncing for a particle vector.
    ///
    /// # Errors
    ///
    /// See [`Simulation::set_wall_bounce`].
    pub fn set_wall(&mut self, wall: &str, pv: &str) -> Result<()> {
        self.sim.set_wall_bounce(wall, pv)
    }

    /// Apply a belonging checker to a particle vector, splitting it into
    /// inside/outside parts. Returns the index of the newly created vector,
    /// if any.
    ///
    /// # Errors
    ///
    /// See [`Simulation::apply_object_belonging_checker`].
    pub fn apply_object_belonging_checker(
        &mut self,
        checker: &str,
        pv: &str,
        correct_every: i64,
        inside: &str,
        outside: &str,
        checkpoint_every: i64,
    ) -> Result<Option<usize>> {
        self.sim.apply_object_belonging_checker(
            checker,
            pv,
            inside,
            outside,
            correct_every,
            checkpoint_every,
        )
    }

    // ------------------------------------------------------------- lifecycle

    /// Run the simulation for the given number of steps.
    ///
    /// # Errors
    ///
    /// Wiring or execution failures.
    pub fn run(&mut self, nsteps: i64) -> Result<()> {
        self.sim.run(nsteps)
    }

    /// Restart the simulation from a checkpoint folder. Typically called
    /// just before `run`; every registered handler restores its state, and
    /// an absent required file is an error.
    ///
    /// # Errors
    ///
    /// Missing checkpoint files.
    pub fn restart(&mut self, folder: &str) -> Result<()> {
        self.sim.restart(folder)
    }

    /// Write a checkpoint of all registered components.
    ///
    /// # Errors
    ///
    /// I/O failures.
    pub fn checkpoint(&self) -> Result<()> {
        self.sim.checkpoint()
    }

    /// Export the task dependency graph as GraphML (see
    /// [`Simulation::save_dependency_graph_graphml`]).
    ///
    /// # Errors
    ///
    /// I/O failures.
    pub fn save_dependency_graph_graphml(&self, fname: &str, current: bool) -> Result<()> {
        self.sim.save_dependency_graph_graphml(fname, current)
    }

    // ------------------------------------------------------- wall utilities

    /// Monte-Carlo estimate of the volume inside the given walls (negative
    /// SDF side).
    ///
    /// # Errors
    ///
    /// Unknown wall names.
    pub fn compute_volume_inside_walls(
        &self,
        wall_names: &[&str],
        n_samples_per_rank: usize,
    ) -> Result<f64> {
        let walls: Vec<&Wall> = wall_names
            .iter()
            .map(|name| self.sim.wall(name))
            .collect::<Result<_>>()?;
        Ok(compute_volume_inside_walls(
            &walls,
            self.sim.domain(),
            n_samples_per_rank,
            0x5eed,
        ))
    }

    /// Sample the combined SDF of the given walls on a grid with spacing
    /// `h` and write it next to a JSON descriptor.
    ///
    /// # Errors
    ///
    /// Unknown wall names or I/O failures.
    pub fn dump_walls_sdf(
        &self,
        wall_names: &[&str],
        h: Vector3<Real>,
        filename: &str,
    ) -> Result<()> {
        let walls: Vec<&Wall> = wall_names
            .iter()
            .map(|name| self.sim.wall(name))
            .collect::<Result<_>>()?;
        dump_walls_sdf(&walls, self.sim.domain(), h, filename)
    }

    /// Create particles frozen inside the walls: a separate equilibration
    /// simulation is run with the given interactions and integrator, then
    /// exactly the particles within the frozen layer (`0 < sdf < rc`) are
    /// kept as a new particle vector.
    ///
    /// # Errors
    ///
    /// Unknown wall names, sub-simulation failures.
    #[allow(clippy::too_many_arguments)]
    pub fn make_frozen_wall_particles(
        &mut self,
        pv_name: &str,
        wall_names: &[&str],
        interactions: Vec<Box<dyn Interaction>>,
        integrator: Box<dyn Integrator>,
        density: Real,
        nsteps: i64,
    ) -> Result<usize> {
        info!(pv = pv_name, "generating frozen wall particles");
        let layer = interactions
            .iter()
            .map(|i| i.rc())
            .fold(1.0 as Real, Real::max);

        let mut set = self.equilibrate_solvent(interactions, integrator, density, nsteps)?;

        let walls: Vec<&Wall> = wall_names
            .iter()
            .map(|name| self.sim.wall(name))
            .collect::<Result<_>>()?;
        let kept = freeze_particles_near_walls(&walls, &mut set, self.sim.domain(), layer);
        info!(pv = pv_name, kept, "frozen wall particles generated");

        let mut pv = ParticleVector::new(pv_name, 1.0);
        pv.local = set;
        self.sim
            .register_particle_vector(AnyVector::Plain(pv), None, 0)
    }

    /// Create particles frozen inside a rigid shape: equilibrate a solvent
    /// with the given handlers, then keep the particles the belonging
    /// checker tags as inside.
    ///
    /// # Errors
    ///
    /// Unknown names, sub-simulation failures.
    #[allow(clippy::too_many_arguments)]
    pub fn make_frozen_rigid_particles(
        &mut self,
        checker: &dyn BelongingChecker,
        shape: &str,
        interactions: Vec<Box<dyn Interaction>>,
        integrator: Box<dyn Integrator>,
        density: Real,
        nsteps: i64,
    ) -> Result<usize> {
        info!(shape, "generating frozen rigid particles");
        let shape_idx = self.sim.pv_index(shape)?;

        let mut set = self.equilibrate_solvent(interactions, integrator, density, nsteps)?;

        let tags = checker.tag_particles(self.sim.pv(shape_idx), &set.positions)?;
        for (i, tag) in tags.iter().enumerate() {
            if *tag == BelongingTag::Outside {
                set.mark(i);
            }
        }
        set.compact_marked();
        for v in &mut set.velocities {
            *v = Vector3::zeros();
        }
        info!(shape, kept = set.len(), "frozen rigid particles generated");

        let mut pv = ParticleVector::new(format!("{shape}_frozen"), 1.0);
        pv.local = set;
        self.sim
            .register_particle_vector(AnyVector::Plain(pv), None, 0)
    }

    /// Run the separate equilibration used by the frozen-particle
    /// factories and hand back its particle set.
    fn equilibrate_solvent(
        &self,
        interactions: Vec<Box<dyn Interaction>>,
        integrator: Box<dyn Integrator>,
        density: Real,
        nsteps: i64,
    ) -> Result<crate::pvs::ParticleSet> {
        let config = CoordinatorConfig::new(self.sim.config().domain, self.sim.config().dt);
        let mut sub = Simulation::new(config)?;
        let pv_idx = sub.register_particle_vector(
            AnyVector::Plain(ParticleVector::new("solvent", 1.0)),
            Some(&UniformIc::new(density)),
            0,
        )?;
        let integrator_name = integrator.name().to_owned();
        for interaction in interactions {
            let name = interaction.name().to_owned();
            sub.register_interaction(interaction)?;
            sub.set_interaction(&name, "solvent", "solvent")?;
        }
        sub.register_integrator(integrator)?;
        sub.set_integrator(&integrator_name, "solvent")?;
        sub.run(nsteps)?;

        Ok(std::mem::take(&mut sub.pv_mut(pv_idx).pv_mut().local))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::interactions::factory;
    use crate::integrators::VelocityVerlet;
    use crate::walls::PlaneWall;

    fn coordinator() -> Coordinator {
        let config = CoordinatorConfig::new(Vector3::new(6.0, 6.0, 6.0), 0.01)
            .with_log_filename("stderr");
        Coordinator::new(config).unwrap()
    }

    #[test]
    fn test_rank_queries() {
        let u = coordinator();
        assert!(u.is_compute_task());
        assert!(u.is_master_task());
        assert_eq!(u.state().step, 0);
    }

    #[test]
    fn test_volume_inside_walls() {
        let mut u = coordinator();
        // Solid above global z = 3: half of the 6^3 box remains.
        u.register_wall(
            Wall::new("top", Box::new(PlaneWall::new(Vector3::new(0.0, 0.0, 1.0), 3.0))),
            0,
        )
        .unwrap();
        let volume = u.compute_volume_inside_walls(&["top"], 50_000).unwrap();
        assert!((volume - 108.0).abs() < 6.0, "volume {volume}");
    }

    #[test]
    fn test_frozen_wall_particles() {
        let mut u = coordinator();
        u.register_wall(
            Wall::new("top", Box::new(PlaneWall::new(Vector3::new(0.0, 0.0, 1.0), 3.0))),
            0,
        )
        .unwrap();
        let idx = u
            .make_frozen_wall_particles(
                "wall_frozen",
                &["top"],
                vec![factory::dpd("dpd", 1.0, 10.0, 10.0, 1.0, 0.5)],
                Box::new(VelocityVerlet::new("vv")),
                3.0,
                10,
            )
            .unwrap();
        let pv = u.simulation().pv(idx);
        assert_eq!(pv.name(), "wall_frozen");
        assert!(!pv.pv().local.is_empty());
        // Everything kept lies inside the frozen layer.
        let wall = u.simulation().wall("top").unwrap();
        for p in &pv.pv().local.positions {
            let phi = wall
                .shape()
                .sdf(u.simulation().domain().local_to_global(*p));
            assert!(phi > 0.0 && phi < 1.0, "sdf {phi}");
        }
    }
}
