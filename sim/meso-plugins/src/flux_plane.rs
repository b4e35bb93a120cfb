//! Moving particles between vectors across a flux plane.

use meso_core::pvs::channel_names;
use meso_core::{Simulation, SimulationPlugin};
use meso_types::{Real, Result, Vector3};
use tracing::debug;

/// Moves particles of one vector into another when they cross the plane
/// `n . x + d = 0` in the direction of the normal (evaluated in global
/// coordinates).
pub struct ExchangePvsFluxPlane {
    name: String,
    pv1: String,
    pv2: String,
    normal: Vector3<Real>,
    offset: Real,
    indices: Option<(usize, usize)>,
}

impl ExchangePvsFluxPlane {
    /// Create a flux-plane exchange plugin; `plane` holds `(nx, ny, nz, d)`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        pv1: impl Into<String>,
        pv2: impl Into<String>,
        plane: [Real; 4],
    ) -> Self {
        Self {
            name: name.into(),
            pv1: pv1.into(),
            pv2: pv2.into(),
            normal: Vector3::new(plane[0], plane[1], plane[2]),
            offset: plane[3],
            indices: None,
        }
    }

    fn side(&self, x_global: Vector3<Real>) -> Real {
        self.normal.dot(&x_global) + self.offset
    }
}

impl SimulationPlugin for ExchangePvsFluxPlane {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        self.indices = Some((sim.pv_index(&self.pv1)?, sim.pv_index(&self.pv2)?));
        Ok(())
    }

    fn before_cell_lists(&mut self, sim: &mut Simulation) -> Result<()> {
        let Some((src_idx, dst_idx)) = self.indices else {
            return Ok(());
        };
        let domain = *sim.domain();

        // Particles that crossed the plane since the last step.
        let mut crossed = Vec::new();
        {
            let set = &sim.pv(src_idx).pv().local;
            let old = set.channels.vector(channel_names::OLD_POSITIONS);
            for i in 0..set.len() {
                let now = self.side(domain.local_to_global(set.positions[i]));
                let before = old.map_or(-1.0, |o| self.side(domain.local_to_global(o[i])));
                if now > 0.0 && before <= 0.0 {
                    crossed.push(i);
                }
            }
        }
        if crossed.is_empty() {
            return Ok(());
        }
        debug!(plugin = %self.name, count = crossed.len(), "particles crossed the flux plane");

        for &i in &crossed {
            let (p, v, id) = {
                let set = &sim.pv(src_idx).pv().local;
                (set.positions[i], set.velocities[i], set.ids[i])
            };
            sim.pv_mut(dst_idx).pv_mut().local.push(p, v, id);
            sim.pv_mut(src_idx).pv_mut().local.mark(i);
        }
        sim.pv_mut(src_idx).pv_mut().local.compact_marked();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use meso_core::integrators::Translate;
    use meso_core::pvs::{AnyVector, ParticleVector};
    use meso_types::{CoordinatorConfig, ParticleId};

    #[test]
    fn test_particles_migrate_across_plane() {
        let config = CoordinatorConfig::new(Vector3::new(8.0, 8.0, 8.0), 0.1);
        let mut sim = Simulation::new(config).unwrap();

        let mut pv1 = ParticleVector::new("left", 1.0);
        // Local x = -0.2 is global 3.8, just left of the plane x = 4.
        pv1.local.push(
            Vector3::new(-0.2, 0.0, 0.0),
            Vector3::zeros(),
            ParticleId::new(0),
        );
        sim.register_particle_vector(AnyVector::Plain(pv1), None, 0)
            .unwrap();
        sim.register_particle_vector(AnyVector::Plain(ParticleVector::new("right", 1.0)), None, 0)
            .unwrap();

        // Drive the particle across the plane x_global = 4.
        sim.register_integrator(Box::new(Translate::new(
            "drift",
            Vector3::new(1.0, 0.0, 0.0),
        )))
        .unwrap();
        sim.set_integrator("drift", "left").unwrap();

        sim.register_plugin(Box::new(ExchangePvsFluxPlane::new(
            "flux",
            "left",
            "right",
            [1.0, 0.0, 0.0, -4.0],
        )))
        .unwrap();

        sim.run(5).unwrap();

        assert_eq!(sim.pv(0).pv().local.len(), 0, "source emptied");
        assert_eq!(sim.pv(1).pv().local.len(), 1, "destination received");
    }
}
