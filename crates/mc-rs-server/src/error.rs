use mc_rs_crypto::CryptoError;
use mc_rs_dispatch::DispatchError;
use mc_rs_proto::{ConnectionState, ProtoError};
use thiserror::Error;

/// Everything that can end (or disturb) a client connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("{packet} is not valid in the {state} state")]
    OutOfSequencePacket {
        state: ConnectionState,
        packet: &'static str,
    },

    #[error("invalid next state {0} in handshake")]
    InvalidNextState(i32),

    #[error("unexpected {0} from client")]
    UnexpectedPacket(&'static str),

    #[error("unknown packet 0x{id:02x} in the {state} state")]
    UnknownPacket { state: ConnectionState, id: i32 },

    #[error("login not completed in time")]
    LoginTimeout,

    #[error("keep-alive timed out")]
    KeepAliveTimeout,

    #[error("keep-alive mismatch: expected {expected:?}, got {received}")]
    KeepAliveMismatch { expected: Option<i32>, received: i32 },

    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Whether the connection must be dropped. Routing misses are the only
    /// recoverable case; framing, sequence and crypto failures all leave the
    /// stream untrustworthy.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Dispatch(DispatchError::Unassigned(_)))
    }

    /// Disconnect message shown to the client, if one should be sent.
    pub fn kick_reason(&self) -> Option<String> {
        match self {
            Self::KeepAliveTimeout | Self::LoginTimeout => Some("Timed out".into()),
            Self::Io(_) | Self::Closed | Self::Proto(_) | Self::Crypto(_) => None,
            other => Some(other.to_string()),
        }
    }
}
