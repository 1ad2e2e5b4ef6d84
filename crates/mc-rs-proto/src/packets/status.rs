//! Status state packets: server list ping.
//!
//! The exchange is Request → Response, then Ping → Pong, after which the
//! server closes the connection.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::codec::{self, ProtoDecode, ProtoEncode, DEFAULT_MAX_STRING};
use crate::error::ProtoError;
use crate::types::VarLong;

/// StatusRequest (0x00): Client → Server. Empty body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusRequest;

impl ProtoEncode for StatusRequest {
    fn proto_encode(&self, _buf: &mut impl BufMut) -> Result<(), ProtoError> {
        Ok(())
    }
}

impl ProtoDecode for StatusRequest {
    fn proto_decode(_buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self)
    }
}

super::impl_packet!(StatusRequest, super::id::status::REQUEST, Status, Inbound);

/// StatusPing (0x01): Client → Server. Carries a client timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPing {
    pub payload: i64,
}

impl ProtoEncode for StatusPing {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        VarLong(self.payload).proto_encode(buf)
    }
}

impl ProtoDecode for StatusPing {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            payload: VarLong::proto_decode(buf)?.0,
        })
    }
}

super::impl_packet!(StatusPing, super::id::status::PING, Status, Inbound);

/// StatusResponse (0x00): Server → Client. A JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub json: String,
}

impl StatusResponse {
    pub fn from_info(info: &ServerListInfo) -> Result<Self, ProtoError> {
        let json =
            serde_json::to_string(info).map_err(|e| ProtoError::InvalidData(e.to_string()))?;
        Ok(Self { json })
    }
}

impl ProtoEncode for StatusResponse {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        codec::write_string(buf, &self.json, DEFAULT_MAX_STRING)
    }
}

impl ProtoDecode for StatusResponse {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            json: codec::read_string(buf, DEFAULT_MAX_STRING)?,
        })
    }
}

super::impl_packet!(StatusResponse, super::id::status::RESPONSE, Status, Outbound);

/// StatusPong (0x01): Server → Client. Carries the server timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPong {
    pub payload: i64,
}

impl ProtoEncode for StatusPong {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        VarLong(self.payload).proto_encode(buf)
    }
}

impl ProtoDecode for StatusPong {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            payload: VarLong::proto_decode(buf)?.0,
        })
    }
}

super::impl_packet!(StatusPong, super::id::status::PONG, Status, Outbound);

/// JSON body of the status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerListInfo {
    pub version: VersionInfo,
    pub players: PlayersInfo,
    pub description: Description,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersInfo {
    pub max: u32,
    pub online: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub text: String,
}
