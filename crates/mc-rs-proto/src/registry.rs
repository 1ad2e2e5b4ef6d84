//! Packet registry: maps (state, direction, id) to a decoder.
//!
//! The table is filled once by [`RegistryBuilder`] and is read-only
//! afterwards, so a single `Arc<PacketRegistry>` can be shared by every
//! connection task without locking. Ids that are not registered decode to
//! [`GamePacket::Unknown`] instead of failing.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use bytes::Bytes;

use crate::error::ProtoError;
use crate::frame::RawFrame;
use crate::packets::{self, GamePacket, Packet, UnknownPacket};
use crate::state::{ConnectionState, Direction};

/// Decoder for one packet body.
pub type DecodeFn = fn(&mut Bytes) -> Result<GamePacket, ProtoError>;

/// Registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketKey {
    pub state: ConnectionState,
    pub direction: Direction,
    pub id: i32,
}

/// A registered packet type.
#[derive(Clone, Copy)]
pub struct PacketFactory {
    pub name: &'static str,
    decode: DecodeFn,
}

impl PacketFactory {
    pub fn decode(&self, body: &mut Bytes) -> Result<GamePacket, ProtoError> {
        (self.decode)(body)
    }
}

impl std::fmt::Debug for PacketFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketFactory")
            .field("name", &self.name)
            .finish()
    }
}

fn decode_as<P: Packet>(body: &mut Bytes) -> Result<GamePacket, ProtoError> {
    Ok(P::proto_decode(body)?.into())
}

/// Collects registrations; duplicates fail immediately.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    factories: HashMap<PacketKey, PacketFactory>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed packet under its declared state, direction and id.
    pub fn register<P: Packet>(&mut self) -> Result<&mut Self, ProtoError> {
        self.register_fn(P::STATE, P::DIRECTION, P::ID, P::NAME, decode_as::<P>)
    }

    /// Register an arbitrary decoder.
    pub fn register_fn(
        &mut self,
        state: ConnectionState,
        direction: Direction,
        id: i32,
        name: &'static str,
        decode: DecodeFn,
    ) -> Result<&mut Self, ProtoError> {
        let key = PacketKey {
            state,
            direction,
            id,
        };
        match self.factories.entry(key) {
            Entry::Occupied(existing) => Err(ProtoError::DuplicatePacketId {
                state,
                direction,
                id,
                existing: existing.get().name,
                name,
            }),
            Entry::Vacant(slot) => {
                slot.insert(PacketFactory { name, decode });
                Ok(self)
            }
        }
    }

    pub fn build(self) -> PacketRegistry {
        PacketRegistry {
            factories: self.factories,
        }
    }
}

/// Immutable packet lookup table.
#[derive(Debug)]
pub struct PacketRegistry {
    factories: HashMap<PacketKey, PacketFactory>,
}

impl PacketRegistry {
    /// The registry for every packet defined in [`crate::packets`].
    pub fn standard() -> Result<Self, ProtoError> {
        let mut builder = RegistryBuilder::new();
        packets::register_all(&mut builder)?;
        Ok(builder.build())
    }

    pub fn lookup(
        &self,
        state: ConnectionState,
        direction: Direction,
        id: i32,
    ) -> Option<&PacketFactory> {
        self.factories.get(&PacketKey {
            state,
            direction,
            id,
        })
    }

    /// Decode a frame received in `state`. Unregistered ids become
    /// [`GamePacket::Unknown`] carrying the raw body.
    pub fn decode(
        &self,
        state: ConnectionState,
        direction: Direction,
        frame: RawFrame,
    ) -> Result<GamePacket, ProtoError> {
        let RawFrame { id, mut body } = frame;
        match self.lookup(state, direction, id) {
            Some(factory) => {
                let packet = factory.decode(&mut body)?;
                if !body.is_empty() {
                    tracing::trace!(
                        "{} left {} trailing bytes unread",
                        factory.name,
                        body.len()
                    );
                }
                Ok(packet)
            }
            None => Ok(GamePacket::Unknown(UnknownPacket {
                state,
                direction,
                id,
                body,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
