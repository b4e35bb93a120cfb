//! Plugin interface.
//!
//! Plugins observe and perturb the simulation at fixed points of the time
//! step. Concrete plugins (statistics, dumps, external forces, control
//! loops) live in the `meso-plugins` crate; the trait lives here, next to
//! the [`Simulation`] it hooks into.

use meso_types::Result;

use crate::simulation::Simulation;

/// A simulation plugin.
///
/// Hooks receive the full simulation; the plugin itself is temporarily
/// detached while its hook runs, so it may freely inspect and mutate
/// vectors and state.
#[allow(unused_variables)]
pub trait SimulationPlugin {
    /// Unique name.
    fn name(&self) -> &str;

    /// One-time setup after all registrations.
    ///
    /// # Errors
    ///
    /// Configuration problems (unknown particle vector names, ...).
    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Called before the cell lists of the step are built.
    ///
    /// # Errors
    ///
    /// Propagated to the caller of `run`.
    fn before_cell_lists(&mut self, sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Called after clearing, before force computation.
    ///
    /// # Errors
    ///
    /// Propagated to the caller of `run`.
    fn before_forces(&mut self, sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Called once the forces of the step are available; dump plugins
    /// write here.
    ///
    /// # Errors
    ///
    /// Propagated to the caller of `run`.
    fn serialize_and_send(&mut self, sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Called right before integration; force-modifying plugins act here.
    ///
    /// # Errors
    ///
    /// Propagated to the caller of `run`.
    fn before_integration(&mut self, sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Called after integration and bounces.
    ///
    /// # Errors
    ///
    /// Propagated to the caller of `run`.
    fn after_integration(&mut self, sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Called before particles are redistributed across the periodic
    /// boundary.
    ///
    /// # Errors
    ///
    /// Propagated to the caller of `run`.
    fn before_particle_distribution(&mut self, sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Called once after the last step of a `run`.
    ///
    /// # Errors
    ///
    /// Propagated to the caller of `run`.
    fn finalize(&mut self, sim: &mut Simulation) -> Result<()> {
        Ok(())
    }

    /// Persist plugin state.
    ///
    /// # Errors
    ///
    /// I/O failures.
    fn checkpoint(&self, folder: &str) -> Result<()> {
        Ok(())
    }

    /// Restore plugin state.
    ///
    /// # Errors
    ///
    /// Missing or malformed state.
    fn restart(&mut self, folder: &str) -> Result<()> {
        Ok(())
    }
}

/// The plugin hook points, in step order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginHook {
    /// Before cell lists.
    BeforeCellLists,
    /// Before forces.
    BeforeForces,
    /// After forces are final (dumps).
    SerializeSend,
    /// Before integration.
    BeforeIntegration,
    /// After integration.
    AfterIntegration,
    /// Before redistribution.
    BeforeParticleDistribution,
}
