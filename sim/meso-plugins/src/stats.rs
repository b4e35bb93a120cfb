//! Global simulation statistics.

use std::io::Write;
use std::time::Instant;

use meso_core::{Simulation, SimulationPlugin};
use meso_types::{Result, SimError, Vector3};
use tracing::info;

/// Reports particle count, momentum, temperature and wall time every
/// `every` steps, to the log and optionally to a stats file.
pub struct SimulationStats {
    name: String,
    every: i64,
    file: Option<std::fs::File>,
    path: Option<String>,
    last_report: Instant,
    steps_since_report: i64,
}

impl SimulationStats {
    /// Create a stats plugin; `path` selects an optional output file.
    #[must_use]
    pub fn new(name: impl Into<String>, every: i64, path: Option<String>) -> Self {
        Self {
            name: name.into(),
            every: every.max(1),
            file: None,
            path,
            last_report: Instant::now(),
            steps_since_report: 0,
        }
    }
}

impl SimulationPlugin for SimulationStats {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, _sim: &mut Simulation) -> Result<()> {
        if let Some(path) = &self.path {
            let mut file =
                std::fs::File::create(path).map_err(|e| SimError::io(path.clone(), e))?;
            writeln!(file, "# step time n_particles px py pz temperature ms_per_step")
                .map_err(|e| SimError::io(path.clone(), e))?;
            self.file = Some(file);
        }
        self.last_report = Instant::now();
        Ok(())
    }

    fn after_integration(&mut self, sim: &mut Simulation) -> Result<()> {
        self.steps_since_report += 1;
        if sim.state().step % self.every != 0 {
            return Ok(());
        }

        let mut n = 0usize;
        let mut momentum = Vector3::<f64>::zeros();
        let mut kinetic = 0.0f64;
        for idx in 0..sim.n_pvs() {
            let pv = sim.pv(idx);
            let mass = f64::from(pv.mass());
            for v in &pv.pv().local.velocities {
                momentum += Vector3::new(f64::from(v.x), f64::from(v.y), f64::from(v.z)) * mass;
                kinetic += 0.5 * mass * f64::from(v.norm_squared());
            }
            n += pv.pv().local.len();
        }
        // Equipartition: <K> = 3/2 N kBT.
        let temperature = if n > 0 {
            2.0 * kinetic / (3.0 * n as f64)
        } else {
            0.0
        };

        let elapsed = self.last_report.elapsed();
        let ms_per_step = if self.steps_since_report > 0 {
            elapsed.as_secs_f64() * 1e3 / self.steps_since_report as f64
        } else {
            0.0
        };
        self.last_report = Instant::now();
        self.steps_since_report = 0;

        info!(
            step = sim.state().step,
            t = sim.state().t,
            n,
            px = momentum.x,
            py = momentum.y,
            pz = momentum.z,
            temperature,
            ms_per_step,
            "stats"
        );

        if let Some(file) = &mut self.file {
            writeln!(
                file,
                "{} {} {} {} {} {} {} {}",
                sim.state().step,
                sim.state().t,
                n,
                momentum.x,
                momentum.y,
                momentum.z,
                temperature,
                ms_per_step,
            )
            .map_err(|e| {
                SimError::io(self.path.clone().unwrap_or_default(), e)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use meso_core::ic::UniformIc;
    use meso_core::pvs::{AnyVector, ParticleVector};
    use meso_types::CoordinatorConfig;

    #[test]
    fn test_stats_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.txt").to_string_lossy().into_owned();

        let config = CoordinatorConfig::new(Vector3::new(4.0, 4.0, 4.0), 0.01);
        let mut sim = Simulation::new(config).unwrap();
        sim.register_particle_vector(
            AnyVector::Plain(ParticleVector::new("solvent", 1.0)),
            Some(&UniformIc::new(2.0)),
            0,
        )
        .unwrap();
        sim.register_plugin(Box::new(SimulationStats::new("stats", 1, Some(path.clone()))))
            .unwrap();
        sim.run(3).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        // Header plus one line per step.
        assert!(text.lines().count() >= 4, "{text}");
        assert!(text.starts_with("# step"));
    }
}
