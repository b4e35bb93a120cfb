//! Loose-particle exchangers: redistribution and halo.

use meso_types::{DomainInfo, Real, Result, Vector3};

use super::fragments::{dir_of, id_of, BULK_ID, N_FRAGMENTS};
use super::{append_msg, extract_channels, ExchangeBuffers, Exchanger, ParticleMsg};
use crate::pvs::AnyVector;

/// Attached-vector entry shared by the particle exchangers.
struct Attached {
    pv_idx: usize,
    rc: Real,
    channels: Vec<String>,
    buffers: ExchangeBuffers,
}

/// Moves particles that left the local box to the neighbor (periodic
/// image) owning them. Leavers are removed locally; arrivals appended.
#[derive(Default)]
pub struct ParticleRedistributor {
    attached: Vec<Attached>,
}

impl ParticleRedistributor {
    /// Create an empty redistributor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a particle vector; its persistent channels travel along.
    pub fn attach(&mut self, pv_idx: usize, pvs: &[AnyVector]) {
        let channels = pvs[pv_idx].pv().local.channels.persistent_names();
        self.attached.push(Attached {
            pv_idx,
            rc: 0.0,
            channels,
            buffers: ExchangeBuffers::default(),
        });
    }
}

impl Exchanger for ParticleRedistributor {
    fn n_attached(&self) -> usize {
        self.attached.len()
    }

    fn need_exchange(&self, index: usize, pvs: &[AnyVector]) -> bool {
        !pvs[self.attached[index].pv_idx].pv().local.is_empty()
    }

    fn pack(&mut self, index: usize, pvs: &mut [AnyVector], domain: &DomainInfo) -> Result<()> {
        let entry = &mut self.attached[index];
        entry.buffers.clear();
        let local_size = domain.local_size;
        let set = &mut pvs[entry.pv_idx].pv_mut().local;

        let mut leavers: Vec<(usize, usize, Vector3<Real>)> = Vec::new();
        for i in 0..set.len() {
            if set.is_marked(i) {
                continue;
            }
            let p = set.positions[i];
            let mut dir = [0i32; 3];
            for k in 0..3 {
                if p[k] < -0.5 * local_size[k] {
                    dir[k] = -1;
                } else if p[k] >= 0.5 * local_size[k] {
                    dir[k] = 1;
                }
            }
            let fid = id_of(dir[0], dir[1], dir[2]);
            if fid != BULK_ID {
                // Shift into the receiving subdomain's frame.
                let shift = Vector3::new(
                    -dir[0] as Real * local_size.x,
                    -dir[1] as Real * local_size.y,
                    -dir[2] as Real * local_size.z,
                );
                leavers.push((i, fid, shift));
            }
        }

        let mut per_fragment: Vec<Vec<usize>> = vec![Vec::new(); N_FRAGMENTS];
        for &(i, fid, _) in &leavers {
            per_fragment[fid].push(i);
        }

        for (fid, indices) in per_fragment.iter().enumerate() {
            if indices.is_empty() {
                continue;
            }
            let dir = dir_of(fid);
            let shift = Vector3::new(
                -dir[0] as Real * local_size.x,
                -dir[1] as Real * local_size.y,
                -dir[2] as Real * local_size.z,
            );
            let msg = &mut entry.buffers.send[fid];
            msg.positions = indices.iter().map(|&i| set.positions[i] + shift).collect();
            msg.velocities = indices.iter().map(|&i| set.velocities[i]).collect();
            msg.ids = indices.iter().map(|&i| set.ids[i]).collect();
            msg.channels = extract_channels(set, &entry.channels, indices);
        }

        for &(i, _, _) in &leavers {
            set.mark(i);
        }
        set.compact_marked();
        Ok(())
    }

    fn unpack(&mut self, index: usize, pvs: &mut [AnyVector], _domain: &DomainInfo) -> Result<()> {
        let entry = &mut self.attached[index];
        let set = &mut pvs[entry.pv_idx].pv_mut().local;
        for msg in &entry.buffers.recv {
            if !msg.is_empty() {
                append_msg(set, msg);
            }
        }
        entry.buffers.clear();
        Ok(())
    }

    fn swap_buffers(&mut self, index: usize) -> Result<()> {
        let entry = &mut self.attached[index];
        let name = format!("redistributor #{}", entry.pv_idx);
        entry.buffers.swap_send_recv(&name)
    }
}

/// Copies boundary particles into the neighbors' halos, with the periodic
/// shift applied. The receiving halo is rebuilt from scratch on every
/// exchange.
#[derive(Default)]
pub struct ParticleHaloExchanger {
    attached: Vec<Attached>,
}

impl ParticleHaloExchanger {
    /// Create an empty halo exchanger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a particle vector with its halo width and the channels to
    /// ship along (densities for the final force pass, old positions for
    /// bouncers, ...).
    pub fn attach(&mut self, pv_idx: usize, rc: Real, channels: Vec<String>) {
        self.attached.push(Attached {
            pv_idx,
            rc,
            channels,
            buffers: ExchangeBuffers::default(),
        });
    }
}

impl Exchanger for ParticleHaloExchanger {
    fn n_attached(&self) -> usize {
        self.attached.len()
    }

    fn need_exchange(&self, _index: usize, _pvs: &[AnyVector]) -> bool {
        // The halo must be rebuilt (possibly to empty) even when no
        // particles are near the boundary, so stale copies disappear.
        true
    }

    fn pack(&mut self, index: usize, pvs: &mut [AnyVector], domain: &DomainInfo) -> Result<()> {
        let entry = &mut self.attached[index];
        entry.buffers.clear();
        let local_size = domain.local_size;
        let rc = entry.rc;
        let set = &pvs[entry.pv_idx].pv().local;

        let mut per_fragment: Vec<Vec<usize>> = vec![Vec::new(); N_FRAGMENTS];
        for i in 0..set.len() {
            if set.is_marked(i) {
                continue;
            }
            let p = set.positions[i];
            // Faces this particle is close to: -1, 0 or +1 per axis.
            let mut near = [[false; 2]; 3];
            for k in 0..3 {
                near[k][0] = p[k] < -0.5 * local_size[k] + rc;
                near[k][1] = p[k] >= 0.5 * local_size[k] - rc;
            }
            // Every fragment whose nonzero directions all match a near
            // face receives a copy: faces, edges and corners.
            for dx in -1..=1i32 {
                for dy in -1..=1i32 {
                    for dz in -1..=1i32 {
                        if dx == 0 && dy == 0 && dz == 0 {
                            continue;
                        }
                        let ok = |d: i32, k: usize| match d {
                            -1 => near[k][0],
                            1 => near[k][1],
                            _ => true,
                        };
                        if ok(dx, 0) && ok(dy, 1) && ok(dz, 2) {
                            per_fragment[id_of(dx, dy, dz)].push(i);
                        }
                    }
                }
            }
        }

        for (fid, indices) in per_fragment.iter().enumerate() {
            if indices.is_empty() {
                continue;
            }
            let dir = dir_of(fid);
            let shift = Vector3::new(
                -dir[0] as Real * local_size.x,
                -dir[1] as Real * local_size.y,
                -dir[2] as Real * local_size.z,
            );
            let msg = &mut entry.buffers.send[fid];
            msg.positions = indices.iter().map(|&i| set.positions[i] + shift).collect();
            msg.velocities = indices.iter().map(|&i| set.velocities[i]).collect();
            msg.ids = indices.iter().map(|&i| set.ids[i]).collect();
            msg.channels = extract_channels(set, &entry.channels, indices);
        }
        Ok(())
    }

    fn unpack(&mut self, index: usize, pvs: &mut [AnyVector], _domain: &DomainInfo) -> Result<()> {
        let entry = &mut self.attached[index];
        let halo = &mut pvs[entry.pv_idx].pv_mut().halo;
        halo.clear();
        for msg in &entry.buffers.recv {
            if !msg.is_empty() {
                append_msg(halo, msg);
            }
        }
        entry.buffers.clear();
        Ok(())
    }

    fn swap_buffers(&mut self, index: usize) -> Result<()> {
        let entry = &mut self.attached[index];
        let name = format!("halo #{}", entry.pv_idx);
        entry.buffers.swap_send_recv(&name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::exchange::SingleNodeEngine;
    use crate::pvs::ParticleVector;
    use meso_types::ParticleId;

    fn domain() -> DomainInfo {
        DomainInfo::single_rank(Vector3::new(4.0, 4.0, 4.0))
    }

    fn solvent(positions: &[[Real; 3]]) -> Vec<AnyVector> {
        let mut pv = ParticleVector::new("pv", 1.0);
        for (i, p) in positions.iter().enumerate() {
            pv.local.push(
                Vector3::new(p[0], p[1], p[2]),
                Vector3::new(0.1, 0.0, 0.0),
                ParticleId::new(i as u64),
            );
        }
        vec![AnyVector::Plain(pv)]
    }

    #[test]
    fn test_redistribution_wraps_periodically() {
        // One particle just past +x, one in the bulk.
        let mut pvs = solvent(&[[2.1, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        let mut redist = ParticleRedistributor::new();
        redist.attach(0, &pvs);
        let mut engine = SingleNodeEngine::new(redist);

        engine.init(&mut pvs, &domain()).unwrap();
        engine.finalize(&mut pvs, &domain()).unwrap();

        let set = &pvs[0].pv().local;
        assert_eq!(set.len(), 2);
        // The leaver reappears wrapped to the -x side.
        let wrapped = set
            .positions
            .iter()
            .find(|p| p.x < 0.0 && p.x > -2.0)
            .copied();
        assert!(wrapped.is_some(), "positions: {:?}", set.positions);
        assert!((wrapped.unwrap().x + 1.9).abs() < 1e-5);
    }

    #[test]
    fn test_corner_particle_gets_seven_halo_copies() {
        let mut pvs = solvent(&[[1.9, 1.9, 1.9]]);
        let mut halo = ParticleHaloExchanger::new();
        halo.attach(0, 1.0, vec![]);
        let mut engine = SingleNodeEngine::new(halo);

        engine.init(&mut pvs, &domain()).unwrap();
        engine.finalize(&mut pvs, &domain()).unwrap();

        // 3 faces + 3 edges + 1 corner.
        assert_eq!(pvs[0].pv().halo.len(), 7);
        // All copies lie outside the local box.
        for p in &pvs[0].pv().halo.positions {
            assert!(!domain().is_inside_local(*p), "halo copy inside: {p:?}");
        }
    }

    #[test]
    fn test_halo_rebuilt_each_time() {
        let mut pvs = solvent(&[[1.9, 0.0, 0.0]]);
        let mut halo = ParticleHaloExchanger::new();
        halo.attach(0, 1.0, vec![]);
        let mut engine = SingleNodeEngine::new(halo);

        for _ in 0..3 {
            engine.init(&mut pvs, &domain()).unwrap();
            engine.finalize(&mut pvs, &domain()).unwrap();
        }
        assert_eq!(pvs[0].pv().halo.len(), 1);
    }

    #[test]
    fn test_bulk_particle_produces_no_halo() {
        let mut pvs = solvent(&[[0.0, 0.0, 0.0]]);
        let mut halo = ParticleHaloExchanger::new();
        halo.attach(0, 1.0, vec![]);
        let mut engine = SingleNodeEngine::new(halo);
        engine.init(&mut pvs, &domain()).unwrap();
        engine.finalize(&mut pvs, &domain()).unwrap();
        assert!(pvs[0].pv().halo.is_empty());
    }
}
