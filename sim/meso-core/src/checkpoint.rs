//! Checkpoint and restart.
//!
//! The simulation clock lives in `_simulation.state` as two plain text
//! lines (time, step). Each particle vector writes `<name>.chk`: a
//! one-line JSON header describing the payload, followed by flat
//! little-endian binary arrays (positions in global coordinates,
//! velocities, ids, persistent channels, rigid motions).

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use meso_types::{DomainInfo, ParticleId, Real, Result, SimError, UnitQuaternion, Vector3};
use nalgebra::Quaternion;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pvs::{AnyVector, ChannelData, ParticleSet};

#[derive(Debug, Serialize, Deserialize)]
struct ChannelDesc {
    name: String,
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PvHeader {
    name: String,
    mass: Real,
    n_particles: usize,
    channels: Vec<ChannelDesc>,
    n_objects: usize,
    has_motions: bool,
}

/// Write the simulation clock.
///
/// # Errors
///
/// I/O failures.
pub fn write_sim_state(folder: &str, t: Real, step: i64) -> Result<()> {
    let path = state_path(folder);
    std::fs::create_dir_all(folder).map_err(|e| SimError::io(folder, e))?;
    std::fs::write(&path, format!("{t}\n{step}\n"))
        .map_err(|e| SimError::io(path.display().to_string(), e))
}

/// Read the simulation clock.
///
/// # Errors
///
/// Missing or malformed state file.
pub fn read_sim_state(folder: &str) -> Result<(Real, i64)> {
    let path = state_path(folder);
    let text = std::fs::read_to_string(&path).map_err(|_| SimError::MissingCheckpoint {
        path: path.display().to_string(),
    })?;
    let mut lines = text.lines();
    let t = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(|| SimError::malformed(path.display().to_string(), "bad time line"))?;
    let step = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(|| SimError::malformed(path.display().to_string(), "bad step line"))?;
    Ok((t, step))
}

fn state_path(folder: &str) -> PathBuf {
    Path::new(folder).join("_simulation.state")
}

fn pv_path(folder: &str, name: &str) -> PathBuf {
    Path::new(folder).join(format!("{name}.chk"))
}

fn flat_f32(vs: &[Vector3<Real>]) -> Vec<Real> {
    vs.iter().flat_map(|v| [v.x, v.y, v.z]).collect()
}

fn unflatten(data: &[Real]) -> Vec<Vector3<Real>> {
    data.chunks_exact(3)
        .map(|c| Vector3::new(c[0], c[1], c[2]))
        .collect()
}

fn write_reals(out: &mut impl Write, data: &[Real], path: &Path) -> Result<()> {
    out.write_all(bytemuck::cast_slice(data))
        .map_err(|e| SimError::io(path.display().to_string(), e))
}

fn read_reals(input: &mut impl Read, n: usize, path: &Path) -> Result<Vec<Real>> {
    let mut bytes = vec![0u8; n * 4];
    input
        .read_exact(&mut bytes)
        .map_err(|e| SimError::io(path.display().to_string(), e))?;
    // The byte buffer has no alignment guarantee; read element-wise.
    Ok(bytes
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<Real>)
        .collect())
}

/// Save one particle vector.
///
/// # Errors
///
/// I/O failures.
pub fn checkpoint_pv(pv: &AnyVector, domain: &DomainInfo, folder: &str) -> Result<()> {
    std::fs::create_dir_all(folder).map_err(|e| SimError::io(folder, e))?;
    let path = pv_path(folder, pv.name());
    let set = &pv.pv().local;

    let channels: Vec<ChannelDesc> = set
        .channels
        .persistent_names()
        .into_iter()
        .filter_map(|name| {
            let kind = match set.channels.get(&name)?.data {
                ChannelData::Scalar(_) => "scalar",
                ChannelData::Vector(_) => "vector",
                ChannelData::Stress(_) => "stress",
            };
            Some(ChannelDesc {
                name,
                kind: kind.to_owned(),
            })
        })
        .collect();

    let (n_objects, has_motions) = match pv {
        AnyVector::Rigid(rov) => (rov.n_objects(), true),
        AnyVector::Membrane(mv) => (mv.n_objects(), false),
        AnyVector::Plain(_) => (0, false),
    };

    let header = PvHeader {
        name: pv.name().to_owned(),
        mass: pv.mass(),
        n_particles: set.len(),
        channels,
        n_objects,
        has_motions,
    };

    let mut out =
        std::fs::File::create(&path).map_err(|e| SimError::io(path.display().to_string(), e))?;
    let header_json = serde_json::to_string(&header)
        .map_err(|e| SimError::malformed(path.display().to_string(), e.to_string()))?;
    writeln!(out, "{header_json}").map_err(|e| SimError::io(path.display().to_string(), e))?;

    // Positions in global coordinates, so a restart is domain-layout
    // independent.
    let global: Vec<Vector3<Real>> = set
        .positions
        .iter()
        .map(|&p| domain.wrap_global(domain.local_to_global(p)))
        .collect();
    write_reals(&mut out, &flat_f32(&global), &path)?;
    write_reals(&mut out, &flat_f32(&set.velocities), &path)?;
    out.write_all(bytemuck::cast_slice(&set.ids))
        .map_err(|e| SimError::io(path.display().to_string(), e))?;

    for desc in &header.channels {
        match &set.channels.get(&desc.name).map(|c| &c.data) {
            Some(ChannelData::Scalar(v)) => write_reals(&mut out, v, &path)?,
            Some(ChannelData::Vector(v)) => write_reals(&mut out, &flat_f32(v), &path)?,
            Some(ChannelData::Stress(v)) => {
                write_reals(&mut out, bytemuck::cast_slice(v), &path)?;
            }
            None => {}
        }
    }

    if let AnyVector::Rigid(rov) = pv {
        let mut motion_data = Vec::with_capacity(rov.n_objects() * 13);
        for m in &rov.motions {
            let com_global = domain.wrap_global(domain.local_to_global(m.com));
            motion_data.extend_from_slice(&[com_global.x, com_global.y, com_global.z]);
            let q = m.q.quaternion();
            motion_data.extend_from_slice(&[q.w, q.i, q.j, q.k]);
            motion_data.extend_from_slice(&[m.vel.x, m.vel.y, m.vel.z]);
            motion_data.extend_from_slice(&[m.omega.x, m.omega.y, m.omega.z]);
        }
        write_reals(&mut out, &motion_data, &path)?;
    }

    info!(pv = %pv.name(), path = %path.display(), "checkpoint written");
    Ok(())
}

/// Restore one particle vector from its checkpoint file.
///
/// # Errors
///
/// Missing checkpoint file or malformed payload.
pub fn restart_pv(pv: &mut AnyVector, domain: &DomainInfo, folder: &str) -> Result<()> {
    let path = pv_path(folder, pv.name());
    let file = std::fs::File::open(&path).map_err(|_| SimError::MissingCheckpoint {
        path: path.display().to_string(),
    })?;
    let mut reader = BufReader::new(file);

    let mut header_line = String::new();
    reader
        .read_line(&mut header_line)
        .map_err(|e| SimError::io(path.display().to_string(), e))?;
    let header: PvHeader = serde_json::from_str(header_line.trim())
        .map_err(|e| SimError::malformed(path.display().to_string(), e.to_string()))?;

    let n = header.n_particles;
    let positions_global = unflatten(&read_reals(&mut reader, n * 3, &path)?);
    let velocities = unflatten(&read_reals(&mut reader, n * 3, &path)?);
    let mut id_bytes = vec![0u8; n * 8];
    reader
        .read_exact(&mut id_bytes)
        .map_err(|e| SimError::io(path.display().to_string(), e))?;
    let ids: Vec<ParticleId> = id_bytes
        .chunks_exact(8)
        .map(|c| ParticleId::new(bytemuck::pod_read_unaligned::<u64>(c)))
        .collect();

    let set: &mut ParticleSet = &mut pv.pv_mut().local;
    set.clear();
    for ((p, v), id) in positions_global.iter().zip(&velocities).zip(&ids) {
        set.push(domain.global_to_local(*p), *v, *id);
    }

    for desc in &header.channels {
        match desc.kind.as_str() {
            "scalar" => {
                let data = read_reals(&mut reader, n, &path)?;
                set.channels
                    .require_scalar(&desc.name, n, crate::pvs::Persistence::Persistent);
                if let Some(v) = set.channels.scalar_mut(&desc.name) {
                    v.copy_from_slice(&data);
                }
            }
            "vector" => {
                let data = unflatten(&read_reals(&mut reader, n * 3, &path)?);
                set.channels
                    .require_vector(&desc.name, n, crate::pvs::Persistence::Persistent);
                if let Some(v) = set.channels.vector_mut(&desc.name) {
                    v.copy_from_slice(&data);
                }
            }
            "stress" => {
                let data = read_reals(&mut reader, n * 6, &path)?;
                set.channels
                    .require_stress(&desc.name, n, crate::pvs::Persistence::Persistent);
                if let Some(v) = set.channels.stress_mut(&desc.name) {
                    v.copy_from_slice(bytemuck::cast_slice(&data));
                }
            }
            other => {
                return Err(SimError::malformed(
                    path.display().to_string(),
                    format!("unknown channel kind '{other}'"),
                ))
            }
        }
    }

    if header.has_motions {
        let rov = pv.as_rigid_mut().ok_or_else(|| {
            SimError::malformed(
                path.display().to_string(),
                "checkpoint carries rigid motions but the vector is not rigid",
            )
        })?;
        let data = read_reals(&mut reader, header.n_objects * 13, &path)?;
        rov.motions.clear();
        for chunk in data.chunks_exact(13) {
            let com_local = domain.global_to_local(Vector3::new(chunk[0], chunk[1], chunk[2]));
            let q = UnitQuaternion::from_quaternion(Quaternion::new(
                chunk[3], chunk[4], chunk[5], chunk[6],
            ));
            let mut motion = crate::pvs::RigidMotion::at_rest(com_local, q);
            motion.vel = Vector3::new(chunk[7], chunk[8], chunk[9]);
            motion.omega = Vector3::new(chunk[10], chunk[11], chunk[12]);
            rov.motions.push(motion);
        }
    }

    info!(pv = %pv.name(), path = %path.display(), "restarted from checkpoint");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pvs::{ParticleVector, Persistence, RigidMotion, RigidVector};

    fn domain() -> DomainInfo {
        DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0))
    }

    #[test]
    fn test_state_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_string_lossy().into_owned();
        write_sim_state(&folder, 1.25, 1250).unwrap();
        assert_eq!(read_sim_state(&folder).unwrap(), (1.25, 1250));
    }

    #[test]
    fn test_missing_state_is_reported() {
        let err = read_sim_state("/nonexistent/folder").unwrap_err();
        assert!(matches!(err, SimError::MissingCheckpoint { .. }));
    }

    #[test]
    fn test_pv_roundtrip_with_channels() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_string_lossy().into_owned();

        let mut pv = AnyVector::Plain(ParticleVector::new("solvent", 1.5));
        {
            let set = &mut pv.pv_mut().local;
            for i in 0..10 {
                set.push(
                    Vector3::new(i as Real * 0.1, 0.0, -1.0),
                    Vector3::new(0.0, i as Real, 0.0),
                    ParticleId::new(100 + i),
                );
            }
            set.channels
                .require_scalar("object_tags", 10, Persistence::Persistent);
            set.channels.scalar_mut("object_tags").unwrap()[3] = 7.0;
        }

        checkpoint_pv(&pv, &domain(), &folder).unwrap();

        let mut restored = AnyVector::Plain(ParticleVector::new("solvent", 1.5));
        restart_pv(&mut restored, &domain(), &folder).unwrap();

        let orig = pv.pv().local.positions.clone();
        let set = &restored.pv().local;
        assert_eq!(set.len(), 10);
        for (a, b) in orig.iter().zip(&set.positions) {
            assert!((a - b).norm() < 1e-5);
        }
        assert_eq!(set.ids[0], ParticleId::new(100));
        assert_eq!(set.channels.scalar("object_tags").unwrap()[3], 7.0);
    }

    #[test]
    fn test_rigid_motions_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_string_lossy().into_owned();

        let mut rov = RigidVector::ellipsoid("ell", 1.0, 1, Vector3::new(1.0, 1.0, 1.0), None);
        rov.template = vec![Vector3::zeros()];
        let mut motion = RigidMotion::at_rest(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_axis_angle(&nalgebra::Vector3::z_axis(), 0.7),
        );
        motion.vel = Vector3::new(0.5, 0.0, 0.0);
        motion.omega = Vector3::new(0.0, 0.0, 0.25);
        rov.motions.push(motion);
        rov.pv
            .local
            .push(Vector3::new(1.0, 2.0, 3.0), Vector3::zeros(), ParticleId::new(0));
        let pv = AnyVector::Rigid(rov);

        checkpoint_pv(&pv, &domain(), &folder).unwrap();

        let mut restored = AnyVector::Rigid(RigidVector::ellipsoid(
            "ell",
            1.0,
            1,
            Vector3::new(1.0, 1.0, 1.0),
            None,
        ));
        restored.as_rigid_mut().unwrap().template = vec![Vector3::zeros()];
        restart_pv(&mut restored, &domain(), &folder).unwrap();

        let m = restored.as_rigid().unwrap().motions[0];
        assert!((m.com - Vector3::new(1.0, 2.0, 3.0)).norm() < 1e-5);
        assert!((m.vel.x - 0.5).abs() < 1e-6);
        assert!((m.omega.z - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_missing_pv_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_string_lossy().into_owned();
        let mut pv = AnyVector::Plain(ParticleVector::new("ghost", 1.0));
        let err = restart_pv(&mut pv, &domain(), &folder).unwrap_err();
        assert!(matches!(err, SimError::MissingCheckpoint { .. }));
    }
}
