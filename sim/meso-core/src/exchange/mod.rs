//! Exchange of particles and objects across the periodic subdomain
//! boundary.
//!
//! Exchangers *pack* outgoing data into per-fragment messages and *unpack*
//! arrived messages; an exchange engine moves the messages between ranks.
//! This build ships the [`SingleNodeEngine`]: with a 1x1x1 rank grid every
//! fragment's peer is the rank itself, so sending amounts to swapping the
//! send buffers into the receive slots (the periodic shift was already
//! applied at packing time). An MPI engine would implement the same
//! [`ExchangeEngine`] seam.

pub mod fragments;
mod objects;
mod particles;

pub use objects::{ObjectHaloExchanger, ObjectRedistributor, ObjectReverseExchanger};
pub use particles::{ParticleHaloExchanger, ParticleRedistributor};

use meso_types::{DomainInfo, ParticleId, Real, Result, SimError, Vector3};

use crate::pvs::{AnyVector, ChannelData};
use fragments::{BULK_ID, N_FRAGMENTS};

/// Particles (with selected channels) headed for one fragment.
#[derive(Debug, Default, Clone)]
pub struct ParticleMsg {
    /// Positions, already shifted into the receiver's frame.
    pub positions: Vec<Vector3<Real>>,
    /// Velocities.
    pub velocities: Vec<Vector3<Real>>,
    /// Ids.
    pub ids: Vec<ParticleId>,
    /// Extra channel payloads, one entry per shipped channel.
    pub channels: Vec<(String, ChannelData)>,
}

impl ParticleMsg {
    /// Number of particles in the message.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when the message is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn clear(&mut self) {
        self.positions.clear();
        self.velocities.clear();
        self.ids.clear();
        self.channels.clear();
    }
}

/// Send/receive message slots of one attached particle vector.
#[derive(Debug)]
pub struct ExchangeBuffers {
    /// Outgoing messages per fragment.
    pub send: Vec<ParticleMsg>,
    /// Incoming messages per fragment.
    pub recv: Vec<ParticleMsg>,
}

impl Default for ExchangeBuffers {
    fn default() -> Self {
        Self {
            send: vec![ParticleMsg::default(); N_FRAGMENTS],
            recv: vec![ParticleMsg::default(); N_FRAGMENTS],
        }
    }
}

impl ExchangeBuffers {
    /// Clear both directions.
    pub fn clear(&mut self) {
        for m in self.send.iter_mut().chain(self.recv.iter_mut()) {
            m.clear();
        }
    }

    /// Single-node transport: swap send into recv.
    ///
    /// # Errors
    ///
    /// A non-empty message to the rank itself (bulk fragment) indicates a
    /// packing bug and fails loudly.
    pub fn swap_send_recv(&mut self, name: &str) -> Result<()> {
        if !self.send[BULK_ID].is_empty() {
            return Err(SimError::invalid_config(format!(
                "non-empty message to itself detected with the single-node engine, \
                 working with particle vector '{name}'"
            )));
        }
        std::mem::swap(&mut self.send, &mut self.recv);
        for m in &mut self.send {
            m.clear();
        }
        Ok(())
    }
}

/// Packs and unpacks one kind of exchanged data.
pub trait Exchanger {
    /// Whether the attached vector at `index` has anything to exchange.
    fn need_exchange(&self, index: usize, pvs: &[AnyVector]) -> bool;

    /// Number of attached vectors.
    fn n_attached(&self) -> usize;

    /// Pack outgoing messages for one attached vector.
    fn pack(&mut self, index: usize, pvs: &mut [AnyVector], domain: &DomainInfo) -> Result<()>;

    /// Unpack received messages for one attached vector.
    fn unpack(&mut self, index: usize, pvs: &mut [AnyVector], domain: &DomainInfo) -> Result<()>;

    /// Transport hook of the single-node engine.
    fn swap_buffers(&mut self, index: usize) -> Result<()>;
}

/// The single-node exchange engine: every fragment's peer is this rank.
pub struct SingleNodeEngine<E: Exchanger> {
    exchanger: E,
}

impl<E: Exchanger> SingleNodeEngine<E> {
    /// Wrap an exchanger.
    pub fn new(exchanger: E) -> Self {
        Self { exchanger }
    }

    /// Access the wrapped exchanger.
    pub fn exchanger(&self) -> &E {
        &self.exchanger
    }

    /// Mutable access to the wrapped exchanger.
    pub fn exchanger_mut(&mut self) -> &mut E {
        &mut self.exchanger
    }

    /// Pack and "send" (swap into the receive slots).
    ///
    /// # Errors
    ///
    /// Packing failures, or data addressed at the bulk fragment.
    pub fn init(&mut self, pvs: &mut [AnyVector], domain: &DomainInfo) -> Result<()> {
        for i in 0..self.exchanger.n_attached() {
            if !self.exchanger.need_exchange(i, pvs) {
                tracing::debug!(index = i, "exchange skipped, nothing to do");
                continue;
            }
            self.exchanger.pack(i, pvs, domain)?;
            self.exchanger.swap_buffers(i)?;
        }
        Ok(())
    }

    /// Unpack everything received.
    ///
    /// # Errors
    ///
    /// Unpacking failures.
    pub fn finalize(&mut self, pvs: &mut [AnyVector], domain: &DomainInfo) -> Result<()> {
        for i in 0..self.exchanger.n_attached() {
            if !self.exchanger.need_exchange(i, pvs) {
                continue;
            }
            self.exchanger.unpack(i, pvs, domain)?;
        }
        Ok(())
    }
}

/// Append a message's particles (and channel payloads) to a particle set.
pub(crate) fn append_msg(set: &mut crate::pvs::ParticleSet, msg: &ParticleMsg) {
    let old_len = set.len();
    set.positions.extend_from_slice(&msg.positions);
    set.velocities.extend_from_slice(&msg.velocities);
    set.ids.extend_from_slice(&msg.ids);
    let new_len = set.len();
    set.channels.resize_all(new_len);

    for (name, payload) in &msg.channels {
        match (payload, set.channels.get_mut(name).map(|c| &mut c.data)) {
            (ChannelData::Scalar(src), Some(ChannelData::Scalar(dst))) => {
                dst[old_len..new_len].copy_from_slice(src);
            }
            (ChannelData::Vector(src), Some(ChannelData::Vector(dst))) => {
                dst[old_len..new_len].copy_from_slice(src);
            }
            (ChannelData::Stress(src), Some(ChannelData::Stress(dst))) => {
                dst[old_len..new_len].copy_from_slice(src);
            }
            _ => {}
        }
    }
}

/// Extract the given channels of the listed particle indices into message
/// payloads.
pub(crate) fn extract_channels(
    set: &crate::pvs::ParticleSet,
    names: &[String],
    indices: &[usize],
) -> Vec<(String, ChannelData)> {
    let mut out = Vec::new();
    for name in names {
        let Some(channel) = set.channels.get(name) else {
            continue;
        };
        let data = match &channel.data {
            ChannelData::Scalar(v) => ChannelData::Scalar(indices.iter().map(|&i| v[i]).collect()),
            ChannelData::Vector(v) => ChannelData::Vector(indices.iter().map(|&i| v[i]).collect()),
            ChannelData::Stress(v) => ChannelData::Stress(indices.iter().map(|&i| v[i]).collect()),
        };
        out.push((name.clone(), data));
    }
    out
}
