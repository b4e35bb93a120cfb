//! PID-controlled bulk velocity.

use meso_core::{Simulation, SimulationPlugin};
use meso_types::{Real, Result, SimError, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A discrete PID controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidControl<T> {
    kp: Real,
    ki: Real,
    kd: Real,
    old_error: T,
    sum_error: T,
}

impl<T> PidControl<T>
where
    T: Copy
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Real, Output = T>,
{
    /// Create a controller from the initial error and the three gains.
    #[must_use]
    pub fn new(initial_error: T, kp: Real, ki: Real, kd: Real) -> Self {
        Self {
            kp,
            ki,
            kd,
            old_error: initial_error,
            sum_error: initial_error,
        }
    }

    /// Advance the controller with the current error and return the
    /// control variable.
    pub fn update(&mut self, error: T) -> T {
        let derivative = error - self.old_error;
        self.sum_error = self.sum_error + error;
        self.old_error = error;
        error * self.kp + self.sum_error * self.ki + derivative * self.kd
    }
}

/// Drives the mean velocity of one or more particle vectors to a target by
/// applying a PID-controlled uniform force.
pub struct VelocityControl {
    name: String,
    pvs: Vec<String>,
    target: Vector3<Real>,
    every: i64,
    pid: PidControl<Vector3<Real>>,
    current_force: Vector3<Real>,
    indices: Vec<usize>,
}

impl VelocityControl {
    /// Create a velocity controller.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        pvs: Vec<String>,
        target: Vector3<Real>,
        every: i64,
        kp: Real,
        ki: Real,
        kd: Real,
    ) -> Self {
        Self {
            name: name.into(),
            pvs,
            target,
            every: every.max(1),
            pid: PidControl::new(Vector3::zeros(), kp, ki, kd),
            current_force: Vector3::zeros(),
            indices: Vec::new(),
        }
    }

    fn state_path(folder: &str, name: &str) -> String {
        format!("{folder}/{name}.pid.json")
    }
}

impl SimulationPlugin for VelocityControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        self.indices = self
            .pvs
            .iter()
            .map(|name| sim.pv_index(name))
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn before_integration(&mut self, sim: &mut Simulation) -> Result<()> {
        if sim.state().step % self.every == 0 {
            let mut velocity = Vector3::<f64>::zeros();
            let mut n = 0usize;
            for &idx in &self.indices {
                for v in &sim.pv(idx).pv().local.velocities {
                    velocity += Vector3::new(f64::from(v.x), f64::from(v.y), f64::from(v.z));
                }
                n += sim.pv(idx).pv().local.len();
            }
            if n > 0 {
                let mean = Vector3::new(
                    (velocity.x / n as f64) as Real,
                    (velocity.y / n as f64) as Real,
                    (velocity.z / n as f64) as Real,
                );
                let error = self.target - mean;
                self.current_force = self.pid.update(error);
                debug!(
                    plugin = %self.name,
                    ?mean,
                    force = ?self.current_force,
                    "velocity control update"
                );
            }
        }

        let force = self.current_force;
        for &idx in &self.indices {
            for f in sim.pv_mut(idx).pv_mut().local.forces_mut() {
                *f += force;
            }
        }
        Ok(())
    }

    fn checkpoint(&self, folder: &str) -> Result<()> {
        let path = Self::state_path(folder, &self.name);
        let json = serde_json::to_string(&self.pid)
            .map_err(|e| SimError::malformed(&path, e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| SimError::io(&path, e))
    }

    fn restart(&mut self, folder: &str) -> Result<()> {
        let path = Self::state_path(folder, &self.name);
        let text = std::fs::read_to_string(&path).map_err(|_| SimError::MissingCheckpoint {
            path: path.clone(),
        })?;
        self.pid =
            serde_json::from_str(&text).map_err(|e| SimError::malformed(&path, e.to_string()))?;
        Ok(())
    }
}
