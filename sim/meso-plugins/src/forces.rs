//! Plugins adding external forces and torques, and the force saver.

use meso_core::pvs::Persistence;
use meso_core::{Simulation, SimulationPlugin};
use meso_types::{Real, Result, SimError, Vector3};

/// Adds a constant force to every particle of a vector each step.
pub struct AddForce {
    name: String,
    pv: String,
    force: Vector3<Real>,
    pv_idx: Option<usize>,
}

impl AddForce {
    /// Create an add-force plugin.
    #[must_use]
    pub fn new(name: impl Into<String>, pv: impl Into<String>, force: Vector3<Real>) -> Self {
        Self {
            name: name.into(),
            pv: pv.into(),
            force,
            pv_idx: None,
        }
    }
}

impl SimulationPlugin for AddForce {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        self.pv_idx = Some(sim.pv_index(&self.pv)?);
        Ok(())
    }

    fn before_integration(&mut self, sim: &mut Simulation) -> Result<()> {
        let Some(idx) = self.pv_idx else {
            return Ok(());
        };
        let force = self.force;
        for f in sim.pv_mut(idx).pv_mut().local.forces_mut() {
            *f += force;
        }
        Ok(())
    }
}

/// Adds a constant torque to every object of a rigid vector each step.
pub struct AddTorque {
    name: String,
    ov: String,
    torque: Vector3<Real>,
    ov_idx: Option<usize>,
}

impl AddTorque {
    /// Create an add-torque plugin.
    #[must_use]
    pub fn new(name: impl Into<String>, ov: impl Into<String>, torque: Vector3<Real>) -> Self {
        Self {
            name: name.into(),
            ov: ov.into(),
            torque,
            ov_idx: None,
        }
    }
}

impl SimulationPlugin for AddTorque {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        let idx = sim.pv_index(&self.ov)?;
        if sim.pv(idx).as_rigid().is_none() {
            return Err(SimError::invalid_config(format!(
                "add-torque plugin '{}' needs a rigid object vector",
                self.name
            )));
        }
        self.ov_idx = Some(idx);
        Ok(())
    }

    fn before_integration(&mut self, sim: &mut Simulation) -> Result<()> {
        let Some(idx) = self.ov_idx else {
            return Ok(());
        };
        let torque = self.torque;
        if let Some(rov) = sim.pv_mut(idx).as_rigid_mut() {
            for motion in &mut rov.motions {
                motion.torque += torque;
            }
        }
        Ok(())
    }
}

/// Copies the forces of the step into a persistent `saved_forces` channel
/// before integration consumes them; dump plugins read it afterwards.
pub struct ForceSaver {
    name: String,
    pv: String,
    pv_idx: Option<usize>,
}

/// Channel the force saver writes.
pub const SAVED_FORCES: &str = "saved_forces";

impl ForceSaver {
    /// Create a force saver.
    #[must_use]
    pub fn new(name: impl Into<String>, pv: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pv: pv.into(),
            pv_idx: None,
        }
    }
}

impl SimulationPlugin for ForceSaver {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        let idx = sim.pv_index(&self.pv)?;
        let set = &mut sim.pv_mut(idx).pv_mut().local;
        let n = set.len();
        set.channels
            .require_vector(SAVED_FORCES, n, Persistence::Persistent);
        self.pv_idx = Some(idx);
        Ok(())
    }

    fn before_integration(&mut self, sim: &mut Simulation) -> Result<()> {
        let Some(idx) = self.pv_idx else {
            return Ok(());
        };
        let set = &mut sim.pv_mut(idx).pv_mut().local;
        let forces = set.forces().to_vec();
        let n = forces.len();
        set.channels
            .require_vector(SAVED_FORCES, n, Persistence::Persistent);
        if let Some(saved) = set.channels.vector_mut(SAVED_FORCES) {
            saved.resize(n, Vector3::zeros());
            saved.copy_from_slice(&forces);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use meso_core::ic::UniformIc;
    use meso_core::integrators::VelocityVerlet;
    use meso_core::pvs::{AnyVector, ParticleVector};
    use meso_types::CoordinatorConfig;

    fn fluid_sim() -> Simulation {
        let config = CoordinatorConfig::new(Vector3::new(4.0, 4.0, 4.0), 0.01);
        let mut sim = Simulation::new(config).unwrap();
        sim.register_particle_vector(
            AnyVector::Plain(ParticleVector::new("solvent", 1.0)),
            Some(&UniformIc::new(2.0)),
            0,
        )
        .unwrap();
        sim.register_integrator(Box::new(VelocityVerlet::new("vv")))
            .unwrap();
        sim.set_integrator("vv", "solvent").unwrap();
        sim
    }

    #[test]
    fn test_add_force_accelerates_mean_velocity() {
        let mut sim = fluid_sim();
        sim.register_plugin(Box::new(AddForce::new(
            "push",
            "solvent",
            Vector3::new(1.0, 0.0, 0.0),
        )))
        .unwrap();

        let mean_vx = |sim: &Simulation| {
            let set = &sim.pv(0).pv().local;
            set.velocities.iter().map(|v| v.x).sum::<Real>() / set.len() as Real
        };

        sim.init().unwrap();
        let before = mean_vx(&sim);
        sim.run(10).unwrap();
        let after = mean_vx(&sim);

        // dv = F/m * dt * nsteps = 0.1.
        assert!((after - before - 0.1).abs() < 0.01, "dv {}", after - before);
    }

    #[test]
    fn test_force_saver_persists_forces() {
        let mut sim = fluid_sim();
        sim.register_plugin(Box::new(AddForce::new(
            "push",
            "solvent",
            Vector3::new(2.0, 0.0, 0.0),
        )))
        .unwrap();
        sim.register_plugin(Box::new(ForceSaver::new("saver", "solvent")))
            .unwrap();
        sim.run(2).unwrap();

        let saved = sim
            .pv(0)
            .pv()
            .local
            .channels
            .vector(SAVED_FORCES)
            .unwrap();
        assert!(saved.iter().all(|f| (f.x - 2.0).abs() < 1e-5));
    }

    #[test]
    fn test_add_torque_requires_rigid() {
        let mut sim = fluid_sim();
        sim.register_plugin(Box::new(AddTorque::new(
            "spin",
            "solvent",
            Vector3::new(0.0, 0.0, 1.0),
        )))
        .unwrap();
        assert!(sim.run(1).is_err());
    }
}
