//! Packet definitions for protocol version 47.
//!
//! Each packet type declares its id, state and direction through [`Packet`].
//! [`GamePacket`] is the tagged union the registry produces and the transport
//! serializes.

pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

use bytes::{BufMut, Bytes};

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::registry::RegistryBuilder;
use crate::state::{ConnectionState, Direction};

pub use handshake::Handshake;
pub use login::{
    EncryptionRequest, EncryptionResponse, LoginDisconnect, LoginStart, LoginSuccess,
    SetCompression,
};
pub use play::{
    ChatBroadcast, ChatMessage, ChatPosition, JoinGame, KeepAlive, KeepAliveResponse,
    PlayDisconnect, PlayerPosition,
};
pub use status::{StatusPing, StatusPong, StatusRequest, StatusResponse};

/// Target protocol version (Minecraft 1.8.x).
pub const PROTOCOL_VERSION: i32 = 47;

/// Game version string reported in the status response.
pub const GAME_VERSION: &str = "1.8.9";

/// Packet ids, grouped by state. Inbound and outbound share a numbering space
/// only within one state and direction.
pub mod id {
    pub mod handshake {
        pub const HANDSHAKE: i32 = 0x00;
    }

    pub mod status {
        pub const REQUEST: i32 = 0x00;
        pub const PING: i32 = 0x01;
        pub const RESPONSE: i32 = 0x00;
        pub const PONG: i32 = 0x01;
    }

    pub mod login {
        pub const LOGIN_START: i32 = 0x00;
        pub const ENCRYPTION_RESPONSE: i32 = 0x01;
        pub const DISCONNECT: i32 = 0x00;
        pub const ENCRYPTION_REQUEST: i32 = 0x01;
        pub const LOGIN_SUCCESS: i32 = 0x02;
        pub const SET_COMPRESSION: i32 = 0x03;
    }

    pub mod play {
        pub const KEEP_ALIVE_RESPONSE: i32 = 0x00;
        pub const CHAT_MESSAGE: i32 = 0x01;
        pub const PLAYER_POSITION: i32 = 0x04;
        pub const KEEP_ALIVE: i32 = 0x00;
        pub const JOIN_GAME: i32 = 0x01;
        pub const CHAT_BROADCAST: i32 = 0x02;
        pub const DISCONNECT: i32 = 0x40;
    }
}

/// A typed packet with a fixed place in the (state, direction, id) space.
pub trait Packet: ProtoEncode + ProtoDecode + Into<GamePacket> {
    const ID: i32;
    const STATE: ConnectionState;
    const DIRECTION: Direction;
    const NAME: &'static str;
}

/// Implement [`Packet`] for a struct defined in one of the submodules.
macro_rules! impl_packet {
    ($ty:ident, $id:expr, $state:ident, $direction:ident) => {
        impl $crate::packets::Packet for $ty {
            const ID: i32 = $id;
            const STATE: $crate::state::ConnectionState = $crate::state::ConnectionState::$state;
            const DIRECTION: $crate::state::Direction = $crate::state::Direction::$direction;
            const NAME: &'static str = stringify!($ty);
        }
    };
}
pub(crate) use impl_packet;

/// A packet whose id is not registered for the state/direction it arrived in.
/// The body is kept undecoded.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownPacket {
    pub state: ConnectionState,
    pub direction: Direction,
    pub id: i32,
    pub body: Bytes,
}

macro_rules! game_packets {
    ($($variant:ident),* $(,)?) => {
        /// Every packet the server understands, plus the pass-through variant.
        #[derive(Debug, Clone, PartialEq)]
        pub enum GamePacket {
            $($variant($variant),)*
            Unknown(UnknownPacket),
        }

        impl GamePacket {
            pub fn id(&self) -> i32 {
                match self {
                    $(Self::$variant(_) => <$variant as Packet>::ID,)*
                    Self::Unknown(p) => p.id,
                }
            }

            /// The state this packet is declared in.
            pub fn state(&self) -> ConnectionState {
                match self {
                    $(Self::$variant(_) => <$variant as Packet>::STATE,)*
                    Self::Unknown(p) => p.state,
                }
            }

            pub fn direction(&self) -> Direction {
                match self {
                    $(Self::$variant(_) => <$variant as Packet>::DIRECTION,)*
                    Self::Unknown(p) => p.direction,
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => <$variant as Packet>::NAME,)*
                    Self::Unknown(_) => "Unknown",
                }
            }

            /// Encode the packet body (without the id prefix).
            pub fn encode_body(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
                match self {
                    $(Self::$variant(p) => p.proto_encode(buf),)*
                    Self::Unknown(p) => {
                        buf.put_slice(&p.body);
                        Ok(())
                    }
                }
            }
        }

        $(
            impl From<$variant> for GamePacket {
                fn from(p: $variant) -> Self {
                    Self::$variant(p)
                }
            }
        )*

        /// Register every typed packet with the builder.
        pub(crate) fn register_all(builder: &mut RegistryBuilder) -> Result<(), ProtoError> {
            $(builder.register::<$variant>()?;)*
            Ok(())
        }
    };
}

game_packets! {
    Handshake,
    StatusRequest,
    StatusPing,
    StatusResponse,
    StatusPong,
    LoginStart,
    EncryptionResponse,
    LoginDisconnect,
    EncryptionRequest,
    LoginSuccess,
    SetCompression,
    KeepAliveResponse,
    ChatMessage,
    PlayerPosition,
    KeepAlive,
    JoinGame,
    ChatBroadcast,
    PlayDisconnect,
}

/// Check whether a client protocol version is supported.
pub fn is_supported_version(v: i32) -> bool {
    v == PROTOCOL_VERSION
}

/// Build the JSON chat component for a plain-text message.
pub fn text_component(text: &str) -> String {
    serde_json::json!({ "text": text }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn metadata_matches_declaration() {
        let packet: GamePacket = ChatMessage {
            message: "hi".into(),
        }
        .into();
        assert_eq!(packet.id(), id::play::CHAT_MESSAGE);
        assert_eq!(packet.state(), ConnectionState::Play);
        assert_eq!(packet.direction(), Direction::Inbound);
        assert_eq!(packet.name(), "ChatMessage");
    }

    #[test]
    fn unknown_passes_body_through() {
        let packet = GamePacket::Unknown(UnknownPacket {
            state: ConnectionState::Play,
            direction: Direction::Inbound,
            id: 0x7F,
            body: Bytes::from_static(&[1, 2, 3]),
        });
        let mut buf = BytesMut::new();
        packet.encode_body(&mut buf).unwrap();
        assert_eq!(&buf[..], &[1, 2, 3]);
        assert_eq!(packet.id(), 0x7F);
        assert_eq!(packet.name(), "Unknown");
    }

    #[test]
    fn supported_version() {
        assert!(is_supported_version(47));
        assert!(!is_supported_version(46));
        assert!(!is_supported_version(340));
    }

    #[test]
    fn text_component_escapes() {
        assert_eq!(text_component("hi"), r#"{"text":"hi"}"#);
        assert_eq!(text_component("a\"b"), r#"{"text":"a\"b"}"#);
    }
}
