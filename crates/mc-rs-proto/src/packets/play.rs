//! Play state packets.

use bytes::{Buf, BufMut};

use crate::codec::{self, ProtoDecode, ProtoEncode, DEFAULT_MAX_STRING};
use crate::error::ProtoError;
use crate::types::VarInt;

/// KeepAliveResponse (0x00): Client → Server. Echoes the server's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveResponse {
    pub keep_alive_id: i32,
}

impl ProtoEncode for KeepAliveResponse {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        VarInt(self.keep_alive_id).proto_encode(buf)
    }
}

impl ProtoDecode for KeepAliveResponse {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            keep_alive_id: VarInt::proto_decode(buf)?.0,
        })
    }
}

super::impl_packet!(
    KeepAliveResponse,
    super::id::play::KEEP_ALIVE_RESPONSE,
    Play,
    Inbound
);

/// ChatMessage (0x01): Client → Server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message: String,
}

impl ChatMessage {
    pub const MAX_LENGTH: usize = 100;
}

impl ProtoEncode for ChatMessage {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        codec::write_string(buf, &self.message, Self::MAX_LENGTH)
    }
}

impl ProtoDecode for ChatMessage {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            message: codec::read_string(buf, Self::MAX_LENGTH)?,
        })
    }
}

super::impl_packet!(ChatMessage, super::id::play::CHAT_MESSAGE, Play, Inbound);

/// PlayerPosition (0x04): Client → Server.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPosition {
    pub x: f64,
    /// Feet position.
    pub y: f64,
    pub z: f64,
    pub on_ground: bool,
}

impl ProtoEncode for PlayerPosition {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        buf.put_f64(self.x);
        buf.put_f64(self.y);
        buf.put_f64(self.z);
        buf.put_u8(self.on_ground as u8);
        Ok(())
    }
}

impl ProtoDecode for PlayerPosition {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            x: codec::read_f64(buf)?,
            y: codec::read_f64(buf)?,
            z: codec::read_f64(buf)?,
            on_ground: codec::read_bool(buf)?,
        })
    }
}

super::impl_packet!(PlayerPosition, super::id::play::PLAYER_POSITION, Play, Inbound);

/// KeepAlive (0x00): Server → Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlive {
    pub keep_alive_id: i32,
}

impl ProtoEncode for KeepAlive {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        VarInt(self.keep_alive_id).proto_encode(buf)
    }
}

impl ProtoDecode for KeepAlive {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            keep_alive_id: VarInt::proto_decode(buf)?.0,
        })
    }
}

super::impl_packet!(KeepAlive, super::id::play::KEEP_ALIVE, Play, Outbound);

/// JoinGame (0x01): Server → Client. First packet in Play.
///
/// Wire format:
/// ```text
/// i32_be:  entity_id
/// u8:      gamemode
/// i8:      dimension (-1 nether, 0 overworld, 1 end)
/// u8:      difficulty
/// u8:      max_players
/// String:  level_type (max 16)
/// bool:    reduced_debug_info
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGame {
    pub entity_id: i32,
    pub gamemode: u8,
    pub dimension: i8,
    pub difficulty: u8,
    pub max_players: u8,
    pub level_type: String,
    pub reduced_debug_info: bool,
}

impl ProtoEncode for JoinGame {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        buf.put_i32(self.entity_id);
        buf.put_u8(self.gamemode);
        buf.put_i8(self.dimension);
        buf.put_u8(self.difficulty);
        buf.put_u8(self.max_players);
        codec::write_string(buf, &self.level_type, 16)?;
        buf.put_u8(self.reduced_debug_info as u8);
        Ok(())
    }
}

impl ProtoDecode for JoinGame {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            entity_id: codec::read_i32(buf)?,
            gamemode: codec::read_u8(buf)?,
            dimension: codec::read_i8(buf)?,
            difficulty: codec::read_u8(buf)?,
            max_players: codec::read_u8(buf)?,
            level_type: codec::read_string(buf, 16)?,
            reduced_debug_info: codec::read_bool(buf)?,
        })
    }
}

super::impl_packet!(JoinGame, super::id::play::JOIN_GAME, Play, Outbound);

/// Where a chat broadcast is shown on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum ChatPosition {
    Chat = 0,
    System = 1,
    ActionBar = 2,
}

impl ChatPosition {
    fn from_i8(v: i8) -> Result<Self, ProtoError> {
        match v {
            0 => Ok(Self::Chat),
            1 => Ok(Self::System),
            2 => Ok(Self::ActionBar),
            other => Err(ProtoError::InvalidData(format!("chat position {other}"))),
        }
    }
}

/// ChatBroadcast (0x02): Server → Client. `json` is a chat component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatBroadcast {
    pub json: String,
    pub position: ChatPosition,
}

impl ChatBroadcast {
    pub fn system(text: &str) -> Self {
        Self {
            json: super::text_component(text),
            position: ChatPosition::System,
        }
    }

    pub fn chat(text: &str) -> Self {
        Self {
            json: super::text_component(text),
            position: ChatPosition::Chat,
        }
    }
}

impl ProtoEncode for ChatBroadcast {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        codec::write_string(buf, &self.json, DEFAULT_MAX_STRING)?;
        buf.put_i8(self.position as i8);
        Ok(())
    }
}

impl ProtoDecode for ChatBroadcast {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            json: codec::read_string(buf, DEFAULT_MAX_STRING)?,
            position: ChatPosition::from_i8(codec::read_i8(buf)?)?,
        })
    }
}

super::impl_packet!(ChatBroadcast, super::id::play::CHAT_BROADCAST, Play, Outbound);

/// Disconnect (0x40): Server → Client, play state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayDisconnect {
    pub reason: String,
}

impl PlayDisconnect {
    pub fn with_message(message: &str) -> Self {
        Self {
            reason: super::text_component(message),
        }
    }
}

impl ProtoEncode for PlayDisconnect {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        codec::write_string(buf, &self.reason, DEFAULT_MAX_STRING)
    }
}

impl ProtoDecode for PlayDisconnect {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            reason: codec::read_string(buf, DEFAULT_MAX_STRING)?,
        })
    }
}

super::impl_packet!(PlayDisconnect, super::id::play::DISCONNECT, Play, Outbound);
