//! Login state packets.
//!
//! Offline flow: LoginStart → [SetCompression] → LoginSuccess.
//! Online flow inserts EncryptionRequest / EncryptionResponse after
//! LoginStart; everything after the response is encrypted.

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{self, ProtoDecode, ProtoEncode, DEFAULT_MAX_STRING};
use crate::error::ProtoError;
use crate::types::VarInt;

/// Maximum username length in characters.
pub const MAX_USERNAME: usize = 16;

/// Upper bound for the key and token byte arrays exchanged during login.
pub const MAX_CRYPTO_ARRAY: usize = 256;

/// LoginStart (0x00): Client → Server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub name: String,
}

impl ProtoEncode for LoginStart {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        codec::write_string(buf, &self.name, MAX_USERNAME)
    }
}

impl ProtoDecode for LoginStart {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            name: codec::read_string(buf, MAX_USERNAME)?,
        })
    }
}

super::impl_packet!(LoginStart, super::id::login::LOGIN_START, Login, Inbound);

/// EncryptionResponse (0x01): Client → Server.
///
/// Both fields are encrypted with the server's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    pub shared_secret: Bytes,
    pub verify_token: Bytes,
}

impl ProtoEncode for EncryptionResponse {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        codec::write_byte_array(buf, &self.shared_secret, MAX_CRYPTO_ARRAY)?;
        codec::write_byte_array(buf, &self.verify_token, MAX_CRYPTO_ARRAY)
    }
}

impl ProtoDecode for EncryptionResponse {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            shared_secret: codec::read_byte_array(buf, MAX_CRYPTO_ARRAY)?,
            verify_token: codec::read_byte_array(buf, MAX_CRYPTO_ARRAY)?,
        })
    }
}

super::impl_packet!(
    EncryptionResponse,
    super::id::login::ENCRYPTION_RESPONSE,
    Login,
    Inbound
);

/// Disconnect (0x00): Server → Client, login state. `reason` is a JSON chat
/// component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginDisconnect {
    pub reason: String,
}

impl LoginDisconnect {
    pub fn with_message(message: &str) -> Self {
        Self {
            reason: super::text_component(message),
        }
    }
}

impl ProtoEncode for LoginDisconnect {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        codec::write_string(buf, &self.reason, DEFAULT_MAX_STRING)
    }
}

impl ProtoDecode for LoginDisconnect {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            reason: codec::read_string(buf, DEFAULT_MAX_STRING)?,
        })
    }
}

super::impl_packet!(LoginDisconnect, super::id::login::DISCONNECT, Login, Outbound);

/// EncryptionRequest (0x01): Server → Client.
///
/// Wire format:
/// ```text
/// String:     server_id (max 20, empty on modern servers)
/// ByteArray:  public_key (SPKI DER)
/// ByteArray:  verify_token
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequest {
    pub server_id: String,
    pub public_key: Bytes,
    pub verify_token: Bytes,
}

impl EncryptionRequest {
    pub const MAX_SERVER_ID: usize = 20;
}

impl ProtoEncode for EncryptionRequest {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        codec::write_string(buf, &self.server_id, Self::MAX_SERVER_ID)?;
        codec::write_byte_array(buf, &self.public_key, MAX_CRYPTO_ARRAY)?;
        codec::write_byte_array(buf, &self.verify_token, MAX_CRYPTO_ARRAY)
    }
}

impl ProtoDecode for EncryptionRequest {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            server_id: codec::read_string(buf, Self::MAX_SERVER_ID)?,
            public_key: codec::read_byte_array(buf, MAX_CRYPTO_ARRAY)?,
            verify_token: codec::read_byte_array(buf, MAX_CRYPTO_ARRAY)?,
        })
    }
}

super::impl_packet!(
    EncryptionRequest,
    super::id::login::ENCRYPTION_REQUEST,
    Login,
    Outbound
);

/// LoginSuccess (0x02): Server → Client. Moves both sides to Play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    /// Hyphenated UUID text.
    pub uuid: String,
    pub username: String,
}

impl ProtoEncode for LoginSuccess {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        codec::write_string(buf, &self.uuid, 36)?;
        codec::write_string(buf, &self.username, MAX_USERNAME)
    }
}

impl ProtoDecode for LoginSuccess {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            uuid: codec::read_string(buf, 36)?,
            username: codec::read_string(buf, MAX_USERNAME)?,
        })
    }
}

super::impl_packet!(LoginSuccess, super::id::login::LOGIN_SUCCESS, Login, Outbound);

/// SetCompression (0x03): Server → Client. Negative threshold disables
/// compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCompression {
    pub threshold: i32,
}

impl ProtoEncode for SetCompression {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        VarInt(self.threshold).proto_encode(buf)
    }
}

impl ProtoDecode for SetCompression {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            threshold: VarInt::proto_decode(buf)?.0,
        })
    }
}

super::impl_packet!(
    SetCompression,
    super::id::login::SET_COMPRESSION,
    Login,
    Outbound
);

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn login_start_rejects_long_names() {
        let mut buf = BytesMut::new();
        let pkt = LoginStart {
            name: "ThisNameIsWayTooLong".into(),
        };
        assert!(pkt.proto_encode(&mut buf).is_err());
    }

    #[test]
    fn encryption_request_layout() {
        let pkt = EncryptionRequest {
            server_id: String::new(),
            public_key: Bytes::from_static(&[0x30, 0x81]),
            verify_token: Bytes::from_static(&[1, 2, 3, 4]),
        };
        let mut buf = BytesMut::new();
        pkt.proto_encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x02, 0x30, 0x81, 0x04, 1, 2, 3, 4]);
        let decoded = EncryptionRequest::proto_decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn encryption_response_roundtrip() {
        let pkt = EncryptionResponse {
            shared_secret: Bytes::from(vec![0xAA; 128]),
            verify_token: Bytes::from(vec![0xBB; 128]),
        };
        let mut buf = BytesMut::new();
        pkt.proto_encode(&mut buf).unwrap();
        // 128 needs a two-byte VarInt prefix
        assert_eq!(buf.len(), 2 + 128 + 2 + 128);
        let decoded = EncryptionResponse::proto_decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn oversized_crypto_array_rejected() {
        let mut buf = BytesMut::new();
        VarInt(100_000).proto_encode(&mut buf).unwrap();
        assert!(matches!(
            EncryptionResponse::proto_decode(&mut buf.freeze()),
            Err(ProtoError::ArrayTooLong { .. })
        ));
    }

    #[test]
    fn set_compression_negative_threshold() {
        let mut buf = BytesMut::new();
        SetCompression { threshold: -1 }.proto_encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 5);
        let decoded = SetCompression::proto_decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.threshold, -1);
    }

    #[test]
    fn disconnect_is_json() {
        let pkt = LoginDisconnect::with_message("Outdated client!");
        assert_eq!(pkt.reason, r#"{"text":"Outdated client!"}"#);
    }
}
