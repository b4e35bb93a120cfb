//! Whole-object exchangers.
//!
//! Objects are never split across the boundary: the halo exchanger copies
//! entire objects (particles, rigid motions) with the periodic shift, the
//! redistributor re-wraps objects whose center of mass left the box, and
//! the reverse exchanger sends halo-accumulated forces and wrenches back
//! to the owning objects. These are the single-node renditions of the
//! object exchange family; ownership never changes on one rank, so the
//! origin bookkeeping doubles as the reverse route.

use meso_types::{DomainInfo, Real, Result, SimError, Vector3};

use crate::pvs::{channel_names, AnyVector};

fn object_count(pv: &AnyVector) -> usize {
    match pv {
        AnyVector::Rigid(rov) => rov.n_objects(),
        AnyVector::Membrane(mv) => mv.n_objects(),
        AnyVector::Plain(_) => 0,
    }
}

fn object_size_of(pv: &AnyVector) -> usize {
    pv.object_size().unwrap_or(0)
}

/// Copies whole objects near the boundary into the halo.
#[derive(Default)]
pub struct ObjectHaloExchanger {
    attached: Vec<(usize, Real, Vec<String>)>,
}

impl ObjectHaloExchanger {
    /// Create an empty object halo exchanger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an object vector with its halo width and extra channels.
    pub fn attach(&mut self, pv_idx: usize, rc: Real, channels: Vec<String>) {
        self.attached.push((pv_idx, rc, channels));
    }

    /// Rebuild the halos of all attached object vectors.
    ///
    /// # Errors
    ///
    /// Mismatched vector kinds.
    pub fn exchange(&mut self, pvs: &mut [AnyVector], domain: &DomainInfo) -> Result<()> {
        for (pv_idx, rc, channels) in &self.attached {
            let pv = &mut pvs[*pv_idx];
            if !pv.is_object() {
                return Err(SimError::invalid_config(
                    "object halo exchanger attached to a plain particle vector",
                ));
            }
            let object_size = object_size_of(pv);
            let n_objects = object_count(pv);
            let local_size = domain.local_size;
            let rc = *rc;

            // Collect (object, shift) pairs: one copy per periodic image
            // whose ghost overlaps the local box.
            let mut copies: Vec<(usize, Vector3<Real>)> = Vec::new();
            {
                let set = &pv.pv().local;
                for obj in 0..n_objects {
                    let base = obj * object_size;
                    let mut near = [[false; 2]; 3];
                    for p in &set.positions[base..base + object_size] {
                        for k in 0..3 {
                            near[k][0] |= p[k] < -0.5 * local_size[k] + rc;
                            near[k][1] |= p[k] >= 0.5 * local_size[k] - rc;
                        }
                    }
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
                                    copies.push((
                                        obj,
                                        Vector3::new(
                                            -dx as Real * local_size.x,
                                            -dy as Real * local_size.y,
                                            -dz as Real * local_size.z,
                                        ),
                                    ));
                                }
                            }
                        }
                    }
                }
            }

            // Rebuild halo particle set.
            let shipped: Vec<String> = channels.clone();
            {
                let local_snapshot: Vec<(Vector3<Real>, Vector3<Real>, meso_types::ParticleId)> =
                    pv.pv()
                        .local
                        .positions
                        .iter()
                        .zip(&pv.pv().local.velocities)
                        .zip(&pv.pv().local.ids)
                        .map(|((p, v), id)| (*p, *v, *id))
                        .collect();
                let indices: Vec<Vec<usize>> = copies
                    .iter()
                    .map(|(obj, _)| (obj * object_size..(obj + 1) * object_size).collect())
                    .collect();
                let payloads: Vec<Vec<(String, crate::pvs::ChannelData)>> = indices
                    .iter()
                    .map(|idx| super::extract_channels(&pv.pv().local, &shipped, idx))
                    .collect();

                let halo = &mut pv.pv_mut().halo;
                halo.clear();
                for (((_, shift), idx), payload) in copies.iter().zip(&indices).zip(payloads) {
                    let msg = super::ParticleMsg {
                        positions: idx.iter().map(|&i| local_snapshot[i].0 + shift).collect(),
                        velocities: idx.iter().map(|&i| local_snapshot[i].1).collect(),
                        ids: idx.iter().map(|&i| local_snapshot[i].2).collect(),
                        channels: payload,
                    };
                    super::append_msg(halo, &msg);
                }
            }

            // Mirror the rigid motions and record origins.
            match pv {
                AnyVector::Rigid(rov) => {
                    rov.halo_motions.clear();
                    rov.halo_origin.clear();
                    for (obj, shift) in &copies {
                        let mut motion = rov.motions[*obj];
                        motion.com += shift;
                        motion.clear_wrenches();
                        rov.halo_motions.push(motion);
                        rov.halo_origin.push((*obj, *shift));
                    }
                }
                AnyVector::Membrane(mv) => {
                    mv.halo_origin = copies.clone();
                }
                AnyVector::Plain(_) => {}
            }
        }
        Ok(())
    }
}

/// Sends halo-accumulated forces and rigid wrenches back to the owning
/// objects.
#[derive(Default)]
pub struct ObjectReverseExchanger {
    attached: Vec<(usize, Vec<String>)>,
}

impl ObjectReverseExchanger {
    /// Create an empty reverse exchanger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an object vector and the channels to fold back.
    pub fn attach(&mut self, pv_idx: usize, channels: Vec<String>) {
        self.attached.push((pv_idx, channels));
    }

    /// Fold halo forces and wrenches back into the owners.
    ///
    /// # Errors
    ///
    /// Mismatched vector kinds.
    pub fn exchange(&mut self, pvs: &mut [AnyVector]) -> Result<()> {
        for (pv_idx, channels) in &self.attached {
            let pv = &mut pvs[*pv_idx];
            let object_size = object_size_of(pv);
            if object_size == 0 {
                return Err(SimError::invalid_config(
                    "object reverse exchanger attached to a plain particle vector",
                ));
            }

            let origins: Vec<usize> = match &*pv {
                AnyVector::Rigid(rov) => rov.halo_origin.iter().map(|(o, _)| *o).collect(),
                AnyVector::Membrane(mv) => mv.halo_origin.iter().map(|(o, _)| *o).collect(),
                AnyVector::Plain(_) => Vec::new(),
            };

            // Fold per-particle channels (forces and friends).
            let mut names = channels.clone();
            if !names.contains(&channel_names::FORCES.to_owned()) {
                names.push(channel_names::FORCES.to_owned());
            }
            for name in &names {
                let Some(halo_data) = pv.pv().halo.channels.get(name).map(|c| c.data.clone())
                else {
                    continue;
                };
                let local = &mut pv.pv_mut().local;
                if let (
                    crate::pvs::ChannelData::Vector(src),
                    Some(crate::pvs::ChannelData::Vector(dst)),
                ) = (&halo_data, local.channels.get_mut(name).map(|c| &mut c.data))
                {
                    for (halo_obj, &owner) in origins.iter().enumerate() {
                        let src_base = halo_obj * object_size;
                        let dst_base = owner * object_size;
                        if src_base + object_size > src.len() || dst_base + object_size > dst.len()
                        {
                            continue;
                        }
                        for k in 0..object_size {
                            dst[dst_base + k] += src[src_base + k];
                        }
                    }
                }
            }

            // Fold rigid wrenches.
            if let AnyVector::Rigid(rov) = pv {
                for (halo_obj, &owner) in origins.iter().enumerate() {
                    let halo_motion = rov.halo_motions[halo_obj];
                    let motion = &mut rov.motions[owner];
                    motion.force += halo_motion.force;
                    motion.torque += halo_motion.torque;
                }
                for m in &mut rov.halo_motions {
                    m.clear_wrenches();
                }
            }
        }
        Ok(())
    }
}

/// Re-wraps objects whose center of mass left the periodic box.
#[derive(Default)]
pub struct ObjectRedistributor {
    attached: Vec<usize>,
}

impl ObjectRedistributor {
    /// Create an empty object redistributor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an object vector.
    pub fn attach(&mut self, pv_idx: usize) {
        self.attached.push(pv_idx);
    }

    /// Wrap stray objects back into the box.
    ///
    /// # Errors
    ///
    /// Mismatched vector kinds.
    pub fn exchange(&mut self, pvs: &mut [AnyVector], domain: &DomainInfo) -> Result<()> {
        for &pv_idx in &self.attached {
            let pv = &mut pvs[pv_idx];
            let object_size = object_size_of(pv);
            if object_size == 0 {
                return Err(SimError::invalid_config(
                    "object redistributor attached to a plain particle vector",
                ));
            }
            let local_size = domain.local_size;
            let n_objects = object_count(pv);

            for obj in 0..n_objects {
                let com = match &*pv {
                    AnyVector::Rigid(rov) => rov.motions[obj].com,
                    _ => {
                        let base = obj * object_size;
                        let set = &pv.pv().local;
                        set.positions[base..base + object_size]
                            .iter()
                            .sum::<Vector3<Real>>()
                            / object_size as Real
                    }
                };

                let mut shift = Vector3::zeros();
                for k in 0..3 {
                    if com[k] < -0.5 * local_size[k] {
                        shift[k] = local_size[k];
                    } else if com[k] >= 0.5 * local_size[k] {
                        shift[k] = -local_size[k];
                    }
                }
                if shift == Vector3::zeros() {
                    continue;
                }

                let base = obj * object_size;
                for p in &mut pv.pv_mut().local.positions[base..base + object_size] {
                    *p += shift;
                }
                if let Some(old) = pv
                    .pv_mut()
                    .local
                    .channels
                    .vector_mut(channel_names::OLD_POSITIONS)
                {
                    for p in &mut old[base..base + object_size] {
                        *p += shift;
                    }
                }
                if let AnyVector::Rigid(rov) = pv {
                    rov.motions[obj].com += shift;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pvs::{MembraneVector, RigidMotion, RigidVector};
    use meso_types::{ParticleId, UnitQuaternion};

    fn domain() -> DomainInfo {
        DomainInfo::single_rank(Vector3::new(8.0, 8.0, 8.0))
    }

    fn rigid_near_face() -> Vec<AnyVector> {
        let mut rov = RigidVector::ellipsoid("ell", 1.0, 2, Vector3::new(0.5, 0.5, 0.5), None);
        rov.template = vec![Vector3::new(0.2, 0.0, 0.0), Vector3::new(-0.2, 0.0, 0.0)];
        rov.motions.push(RigidMotion::at_rest(
            Vector3::new(3.8, 0.0, 0.0),
            UnitQuaternion::identity(),
        ));
        for _ in 0..2 {
            rov.pv
                .local
                .push(Vector3::zeros(), Vector3::zeros(), ParticleId::new(0));
        }
        rov.project_all();
        vec![AnyVector::Rigid(rov)]
    }

    #[test]
    fn test_object_halo_copies_whole_object() {
        let mut pvs = rigid_near_face();
        let mut exchanger = ObjectHaloExchanger::new();
        exchanger.attach(0, 1.0, vec![]);
        exchanger.exchange(&mut pvs, &domain()).unwrap();

        let rov = pvs[0].as_rigid().unwrap();
        assert_eq!(rov.halo_motions.len(), 1);
        assert_eq!(rov.pv.halo.len(), 2);
        assert!(rov.halo_motions[0].com.x < -3.0);
        assert_eq!(rov.halo_origin[0].0, 0);
    }

    #[test]
    fn test_reverse_folds_wrenches_back() {
        let mut pvs = rigid_near_face();
        let mut halo = ObjectHaloExchanger::new();
        halo.attach(0, 1.0, vec![]);
        halo.exchange(&mut pvs, &domain()).unwrap();

        {
            let rov = pvs[0].as_rigid_mut().unwrap();
            rov.halo_motions[0].force = Vector3::new(0.0, 2.0, 0.0);
            let n = rov.pv.halo.len();
            for f in rov.pv.halo.forces_mut().iter_mut().take(n) {
                *f = Vector3::new(1.0, 0.0, 0.0);
            }
        }

        let mut reverse = ObjectReverseExchanger::new();
        reverse.attach(0, vec![]);
        reverse.exchange(&mut pvs).unwrap();

        let rov = pvs[0].as_rigid().unwrap();
        assert_eq!(rov.motions[0].force, Vector3::new(0.0, 2.0, 0.0));
        assert_eq!(rov.pv.local.forces()[0], Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_object_redistribution_wraps_com() {
        let mesh = crate::mesh::Mesh::icosphere(0, 0.5);
        let mut mv = MembraneVector::new("rbc", 1.0, mesh.clone());
        let offset = Vector3::new(4.2, 0.0, 0.0); // past +x face
        for (i, v) in mesh.vertices().iter().enumerate() {
            mv.pv
                .local
                .push(v + offset, Vector3::zeros(), ParticleId::new(i as u64));
        }
        let mut pvs = vec![AnyVector::Membrane(mv)];

        let mut redist = ObjectRedistributor::new();
        redist.attach(0);
        redist.exchange(&mut pvs, &domain()).unwrap();

        let com: Vector3<Real> = pvs[0].pv().local.positions.iter().sum::<Vector3<Real>>()
            / pvs[0].pv().local.len() as Real;
        assert!(com.x < 0.0, "wrapped com {com:?}");
    }
}
