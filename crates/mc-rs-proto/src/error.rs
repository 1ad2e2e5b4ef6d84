//! Protocol-level errors.

use thiserror::Error;

use crate::state::{ConnectionState, Direction};

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer too short: need {needed} more bytes, have {remaining}")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("malformed VarInt: {0}")]
    MalformedVarInt(#[from] crate::types::VarIntError),

    #[error("truncated string: declared {declared} bytes, {available} available")]
    TruncatedString { declared: usize, available: usize },

    #[error("string too long: {length} exceeds maximum of {max}")]
    StringTooLong { length: usize, max: usize },

    #[error("byte array too long: {length} exceeds maximum of {max}")]
    ArrayTooLong { length: usize, max: usize },

    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("frame of {length} bytes exceeds maximum of {max}")]
    FrameTooLarge { length: usize, max: usize },

    #[error("compression error: {0}")]
    CompressError(String),

    #[error("decompression error: {0}")]
    DecompressError(String),

    #[error("badly compressed frame: {0}")]
    BadCompressedLength(String),

    #[error("duplicate packet id 0x{id:02X} for {state}/{direction} ({existing} and {name})")]
    DuplicatePacketId {
        state: ConnectionState,
        direction: Direction,
        id: i32,
        existing: &'static str,
        name: &'static str,
    },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl ProtoError {
    /// Fail with `BufferTooShort` unless `needed` bytes remain.
    pub fn ensure(remaining: usize, needed: usize) -> Result<(), Self> {
        if remaining < needed {
            return Err(Self::BufferTooShort { needed, remaining });
        }
        Ok(())
    }
}
