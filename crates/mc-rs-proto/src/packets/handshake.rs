//! Handshake (0x00): Client → Server, handshake state.

use bytes::{Buf, BufMut};

use crate::codec::{self, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::VarInt;

/// First packet on every connection. `next_state` selects Status (1) or
/// Login (2).
///
/// Wire format:
/// ```text
/// VarInt:  protocol_version
/// String:  server_address (max 255)
/// u16_be:  server_port
/// VarInt:  next_state
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
}

impl Handshake {
    pub const MAX_ADDRESS: usize = 255;
}

impl ProtoEncode for Handshake {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        VarInt(self.protocol_version).proto_encode(buf)?;
        codec::write_string(buf, &self.server_address, Self::MAX_ADDRESS)?;
        buf.put_u16(self.server_port);
        VarInt(self.next_state).proto_encode(buf)
    }
}

impl ProtoDecode for Handshake {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            protocol_version: VarInt::proto_decode(buf)?.0,
            server_address: codec::read_string(buf, Self::MAX_ADDRESS)?,
            server_port: codec::read_u16(buf)?,
            next_state: VarInt::proto_decode(buf)?.0,
        })
    }
}

super::impl_packet!(Handshake, super::id::handshake::HANDSHAKE, Handshake, Inbound);
