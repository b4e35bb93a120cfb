//! Dump plugins: XYZ frames, binary particle channels, PLY meshes and
//! per-object statistics tables.

use std::io::Write;
use std::path::{Path, PathBuf};

use meso_core::pvs::{AnyVector, ChannelData};
use meso_core::{Simulation, SimulationPlugin};
use meso_types::{Real, Result, SimError, Vector3};

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| SimError::io(path.display().to_string(), e))
}

fn due(sim: &Simulation, every: i64) -> bool {
    sim.state().step % every.max(1) == 0
}

/// Writes XYZ snapshots of a particle vector.
pub struct DumpXyz {
    name: String,
    pv: String,
    every: i64,
    path: PathBuf,
    pv_idx: Option<usize>,
    frame: usize,
}

impl DumpXyz {
    /// Create an XYZ dumper writing `<path>/<pv>_NNNNN.xyz`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        pv: impl Into<String>,
        every: i64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            pv: pv.into(),
            every,
            path: path.into(),
            pv_idx: None,
            frame: 0,
        }
    }
}

impl SimulationPlugin for DumpXyz {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        self.pv_idx = Some(sim.pv_index(&self.pv)?);
        ensure_dir(&self.path)
    }

    fn serialize_and_send(&mut self, sim: &mut Simulation) -> Result<()> {
        let Some(idx) = self.pv_idx else {
            return Ok(());
        };
        if !due(sim, self.every) {
            return Ok(());
        }
        let file_path = self.path.join(format!("{}_{:05}.xyz", self.pv, self.frame));
        self.frame += 1;

        let domain = *sim.domain();
        let set = &sim.pv(idx).pv().local;
        let mut out = String::with_capacity(set.len() * 32);
        out.push_str(&format!("{}\n", set.len()));
        out.push_str(&format!("step {} t {}\n", sim.state().step, sim.state().t));
        for p in &set.positions {
            let g = domain.local_to_global(*p);
            out.push_str(&format!("A {} {} {}\n", g.x, g.y, g.z));
        }
        std::fs::write(&file_path, out)
            .map_err(|e| SimError::io(file_path.display().to_string(), e))
    }
}

/// Writes positions plus selected channels as flat binary arrays with a
/// JSON sidecar describing the layout.
pub struct DumpParticles {
    name: String,
    pv: String,
    every: i64,
    channels: Vec<String>,
    path: PathBuf,
    pv_idx: Option<usize>,
    frame: usize,
}

impl DumpParticles {
    /// Create a particle dumper.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        pv: impl Into<String>,
        every: i64,
        channels: Vec<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            pv: pv.into(),
            every,
            channels,
            path: path.into(),
            pv_idx: None,
            frame: 0,
        }
    }
}

impl SimulationPlugin for DumpParticles {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        self.pv_idx = Some(sim.pv_index(&self.pv)?);
        ensure_dir(&self.path)
    }

    fn serialize_and_send(&mut self, sim: &mut Simulation) -> Result<()> {
        let Some(idx) = self.pv_idx else {
            return Ok(());
        };
        if !due(sim, self.every) {
            return Ok(());
        }
        let base = self.path.join(format!("{}-{:05}", self.pv, self.frame));
        self.frame += 1;

        let domain = *sim.domain();
        let set = &sim.pv(idx).pv().local;
        let data_path = base.with_extension("bin");
        let mut out = std::fs::File::create(&data_path)
            .map_err(|e| SimError::io(data_path.display().to_string(), e))?;

        let mut layout = vec![serde_json::json!({"name": "positions", "kind": "vector"})];
        let flat: Vec<Real> = set
            .positions
            .iter()
            .map(|p| domain.local_to_global(*p))
            .flat_map(|g| [g.x, g.y, g.z])
            .collect();
        out.write_all(bytemuck::cast_slice(&flat))
            .map_err(|e| SimError::io(data_path.display().to_string(), e))?;

        for name in &self.channels {
            let Some(channel) = set.channels.get(name) else {
                continue;
            };
            let (kind, bytes): (&str, Vec<u8>) = match &channel.data {
                ChannelData::Scalar(v) => ("scalar", bytemuck::cast_slice(v).to_vec()),
                ChannelData::Vector(v) => {
                    let flat: Vec<Real> = v.iter().flat_map(|x| [x.x, x.y, x.z]).collect();
                    ("vector", bytemuck::cast_slice(&flat).to_vec())
                }
                ChannelData::Stress(v) => ("stress", bytemuck::cast_slice(v).to_vec()),
            };
            out.write_all(&bytes)
                .map_err(|e| SimError::io(data_path.display().to_string(), e))?;
            layout.push(serde_json::json!({"name": name, "kind": kind}));
        }

        let meta = serde_json::json!({
            "pv": self.pv,
            "n_particles": set.len(),
            "step": sim.state().step,
            "time": sim.state().t,
            "layout": layout,
        });
        let meta_path = base.with_extension("json");
        std::fs::write(&meta_path, meta.to_string())
            .map_err(|e| SimError::io(meta_path.display().to_string(), e))
    }
}

/// Writes PLY snapshots of membrane or rigid surface meshes.
pub struct DumpMesh {
    name: String,
    ov: String,
    every: i64,
    path: PathBuf,
    ov_idx: Option<usize>,
    frame: usize,
}

impl DumpMesh {
    /// Create a mesh dumper.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        ov: impl Into<String>,
        every: i64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            ov: ov.into(),
            every,
            path: path.into(),
            ov_idx: None,
            frame: 0,
        }
    }
}

impl SimulationPlugin for DumpMesh {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        let idx = sim.pv_index(&self.ov)?;
        if !sim.pv(idx).is_object() {
            return Err(SimError::invalid_config(format!(
                "mesh dump plugin '{}' needs an object vector",
                self.name
            )));
        }
        self.ov_idx = Some(idx);
        ensure_dir(&self.path)
    }

    fn serialize_and_send(&mut self, sim: &mut Simulation) -> Result<()> {
        let Some(idx) = self.ov_idx else {
            return Ok(());
        };
        if !due(sim, self.every) {
            return Ok(());
        }
        let pv = sim.pv(idx);
        let mesh = match pv {
            AnyVector::Membrane(mv) => mv.mesh.clone(),
            AnyVector::Rigid(rov) => match &rov.mesh {
                Some(mesh) => mesh.clone(),
                None => return Ok(()),
            },
            AnyVector::Plain(_) => return Ok(()),
        };

        let file_path = self.path.join(format!("{}_{:05}.ply", self.ov, self.frame));
        self.frame += 1;

        let domain = *sim.domain();
        let set = &pv.pv().local;
        let nv = mesh.n_vertices();
        let n_objects = if nv == 0 { 0 } else { set.len() / nv };

        let mut out = String::new();
        out.push_str("ply\nformat ascii 1.0\n");
        out.push_str(&format!("element vertex {}\n", set.len()));
        out.push_str("property float x\nproperty float y\nproperty float z\n");
        out.push_str(&format!("element face {}\n", n_objects * mesh.n_faces()));
        out.push_str("property list uchar int vertex_index\nend_header\n");
        for p in &set.positions {
            let g = domain.local_to_global(*p);
            out.push_str(&format!("{} {} {}\n", g.x, g.y, g.z));
        }
        for obj in 0..n_objects {
            let base = obj * nv;
            for f in mesh.faces() {
                out.push_str(&format!(
                    "3 {} {} {}\n",
                    base + f[0] as usize,
                    base + f[1] as usize,
                    base + f[2] as usize
                ));
            }
        }
        std::fs::write(&file_path, out)
            .map_err(|e| SimError::io(file_path.display().to_string(), e))
    }
}

/// Appends a per-object statistics table: center of mass, orientation,
/// velocities, force and torque.
pub struct DumpObjectStats {
    name: String,
    ov: String,
    every: i64,
    path: PathBuf,
    ov_idx: Option<usize>,
}

impl DumpObjectStats {
    /// Create an object-stats dumper writing `<path>/<ov>.txt`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        ov: impl Into<String>,
        every: i64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            ov: ov.into(),
            every,
            path: path.into(),
            ov_idx: None,
        }
    }

    fn table_path(&self) -> PathBuf {
        self.path.join(format!("{}.txt", self.ov))
    }
}

impl SimulationPlugin for DumpObjectStats {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, sim: &mut Simulation) -> Result<()> {
        let idx = sim.pv_index(&self.ov)?;
        self.ov_idx = Some(idx);
        ensure_dir(&self.path)?;
        let path = self.table_path();
        std::fs::write(
            &path,
            "# obj time comx comy comz qw qx qy qz vx vy vz wx wy wz fx fy fz tx ty tz\n",
        )
        .map_err(|e| SimError::io(path.display().to_string(), e))
    }

    fn serialize_and_send(&mut self, sim: &mut Simulation) -> Result<()> {
        let Some(idx) = self.ov_idx else {
            return Ok(());
        };
        if !due(sim, self.every) {
            return Ok(());
        }
        let domain = *sim.domain();
        let t = sim.state().t;

        let mut rows = String::new();
        match sim.pv(idx) {
            AnyVector::Rigid(rov) => {
                for (obj, m) in rov.motions.iter().enumerate() {
                    let com = domain.local_to_global(m.com);
                    let q = m.q.quaternion();
                    rows.push_str(&format!(
                        "{obj} {t} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {}\n",
                        com.x,
                        com.y,
                        com.z,
                        q.w,
                        q.i,
                        q.j,
                        q.k,
                        m.vel.x,
                        m.vel.y,
                        m.vel.z,
                        m.omega.x,
                        m.omega.y,
                        m.omega.z,
                        m.force.x,
                        m.force.y,
                        m.force.z,
                        m.torque.x,
                        m.torque.y,
                        m.torque.z,
                    ));
                }
            }
            AnyVector::Membrane(mv) => {
                let nv = mv.object_size().max(1);
                for obj in 0..mv.n_objects() {
                    let base = obj * nv;
                    let com: Vector3<Real> = mv.pv.local.positions[base..base + nv]
                        .iter()
                        .sum::<Vector3<Real>>()
                        / nv as Real;
                    let com = domain.local_to_global(com);
                    rows.push_str(&format!(
                        "{obj} {t} {} {} {} 1 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0\n",
                        com.x, com.y, com.z
                    ));
                }
            }
            AnyVector::Plain(_) => {}
        }

        let path = self.table_path();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| SimError::io(path.display().to_string(), e))?;
        file.write_all(rows.as_bytes())
            .map_err(|e| SimError::io(path.display().to_string(), e))
    }
}
