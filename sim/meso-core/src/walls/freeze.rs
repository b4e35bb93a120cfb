//! Wall utilities: frozen-layer extraction, Monte-Carlo volume and SDF
//! grid dumps.

use std::io::Write;
use std::path::Path;

use meso_types::{DomainInfo, Real, Result, SimError, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Wall;
use crate::pvs::ParticleSet;

/// Keep exactly the particles of `set` lying in the frozen layer of the
/// walls: `0 < max_w sdf(x) < layer_thickness`. Everything else is
/// dropped. Returns the number of particles kept.
pub fn freeze_particles_near_walls(
    walls: &[&Wall],
    set: &mut ParticleSet,
    domain: &DomainInfo,
    layer_thickness: Real,
) -> usize {
    for i in 0..set.len() {
        let global = domain.local_to_global(set.positions[i]);
        let phi = walls
            .iter()
            .map(|w| w.shape().sdf(global))
            .fold(Real::MIN, Real::max);
        if !(phi > 0.0 && phi < layer_thickness) {
            set.mark(i);
        }
    }
    set.compact_marked();
    // Frozen particles do not keep their equilibration motion.
    for v in &mut set.velocities {
        *v = Vector3::zeros();
    }
    set.len()
}

/// Monte-Carlo estimate of the fluid volume (`sdf < 0` under all walls)
/// of the global domain.
#[must_use]
pub fn compute_volume_inside_walls(
    walls: &[&Wall],
    domain: &DomainInfo,
    n_samples: usize,
    seed: u64,
) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut inside = 0usize;
    for _ in 0..n_samples {
        let p = Vector3::new(
            rng.gen::<Real>() * domain.global_size.x,
            rng.gen::<Real>() * domain.global_size.y,
            rng.gen::<Real>() * domain.global_size.z,
        );
        let phi = walls
            .iter()
            .map(|w| w.shape().sdf(p))
            .fold(Real::MIN, Real::max);
        if phi < 0.0 {
            inside += 1;
        }
    }
    domain.global_volume() * inside as f64 / n_samples as f64
}

/// Sample the combined wall SDF on a regular grid with spacing `h` and
/// write it as a flat little-endian `f32` array plus a JSON sidecar
/// describing the grid.
///
/// # Errors
///
/// I/O failures.
pub fn dump_walls_sdf(
    walls: &[&Wall],
    domain: &DomainInfo,
    h: Vector3<Real>,
    filename: &str,
) -> Result<()> {
    let n = [
        (domain.global_size.x / h.x).ceil() as usize + 1,
        (domain.global_size.y / h.y).ceil() as usize + 1,
        (domain.global_size.z / h.z).ceil() as usize + 1,
    ];

    let mut values = Vec::with_capacity(n[0] * n[1] * n[2]);
    for iz in 0..n[2] {
        for iy in 0..n[1] {
            for ix in 0..n[0] {
                let p = Vector3::new(ix as Real * h.x, iy as Real * h.y, iz as Real * h.z);
                let phi = walls
                    .iter()
                    .map(|w| w.shape().sdf(p))
                    .fold(Real::MIN, Real::max);
                values.push(phi);
            }
        }
    }

    let data_path = format!("{filename}.sdf");
    let meta_path = format!("{filename}.json");
    if let Some(parent) = Path::new(&data_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| SimError::io(&data_path, e))?;
        }
    }

    let mut file = std::fs::File::create(&data_path).map_err(|e| SimError::io(&data_path, e))?;
    file.write_all(bytemuck::cast_slice(&values))
        .map_err(|e| SimError::io(&data_path, e))?;

    let meta = serde_json::json!({
        "dims": n,
        "spacing": [h.x, h.y, h.z],
        "domain": [domain.global_size.x, domain.global_size.y, domain.global_size.z],
        "inside_is_negative": true,
    });
    std::fs::write(&meta_path, meta.to_string()).map_err(|e| SimError::io(&meta_path, e))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pvs::ParticleSet;
    use crate::walls::PlaneWall;
    use meso_types::ParticleId;

    fn half_domain_wall() -> Wall {
        // Solid above global z = 4 in an 8^3 box.
        Wall::new(
            "top",
            Box::new(PlaneWall::new(Vector3::new(0.0, 0.0, 1.0), 4.0)),
        )
    }

    #[test]
    fn test_mc_volume_half_box() {
        let wall = half_domain_wall();
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        let volume = compute_volume_inside_walls(&[&wall], &domain, 100_000, 7);
        let expected = 256.0;
        assert!(
            (volume - expected).abs() < 0.03 * 512.0,
            "volume {volume} vs {expected}"
        );
    }

    #[test]
    fn test_freeze_keeps_layer() {
        let wall = half_domain_wall();
        let domain = DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0));
        let mut set = ParticleSet::new();
        // Global z: 3.5 (fluid), 4.5 (layer), 7.0 (deep solid).
        for (i, z) in [-0.5, 0.5, 3.0].iter().enumerate() {
            set.push(
                Vector3::new(0.0, 0.0, *z),
                Vector3::new(1.0, 0.0, 0.0),
                ParticleId::new(i as u64),
            );
        }
        let kept = freeze_particles_near_walls(&[&wall], &mut set, &domain, 1.0);
        assert_eq!(kept, 1);
        assert_eq!(set.velocities[0], Vector3::zeros());
    }

    #[test]
    fn test_dump_sdf_writes_files() {
        let wall = half_domain_wall();
        let domain = DomainInfo::single_rank(Vector3::new(4.0, 4.0, 4.0));
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("wall").to_string_lossy().into_owned();
        dump_walls_sdf(&[&wall], &domain, Vector3::new(1.0, 1.0, 1.0), &base).unwrap();
        let data = std::fs::read(format!("{base}.sdf")).unwrap();
        assert_eq!(data.len(), 5 * 5 * 5 * 4);
        let meta = std::fs::read_to_string(format!("{base}.json")).unwrap();
        assert!(meta.contains("spacing"));
    }
}
