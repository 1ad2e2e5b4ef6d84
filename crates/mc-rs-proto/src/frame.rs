//! Stream framing: `(length: VarInt)(packet id: VarInt)(body)`.
//!
//! Once a compression threshold is set, the frame content becomes
//! `(data_length: VarInt)(payload)`, where `data_length == 0` marks an
//! uncompressed payload and any other value is the inflated size of a zlib
//! payload.
//!
//! [`FrameCodec`] only handles plaintext. Encryption is a byte-stream
//! transform applied by the transport before bytes are pushed in and after
//! frames are written out.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::compression;
use crate::error::ProtoError;
use crate::packets::GamePacket;
use crate::types::VarInt;

/// Largest frame length a three-byte VarInt can express.
pub const MAX_FRAME_LENGTH: usize = 2_097_151;

/// Zlib level used for outgoing frames.
pub const COMPRESSION_LEVEL: u32 = 6;

/// One packet's id and undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub id: i32,
    pub body: Bytes,
}

/// Incremental frame reader and frame writer for one connection.
#[derive(Debug)]
pub struct FrameCodec {
    buffer: BytesMut,
    compression_threshold: Option<usize>,
    max_frame_length: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_LENGTH)
    }
}

impl FrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            compression_threshold: None,
            max_frame_length,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed as frames.
    ///
    /// Exposed mutably so the transport can decrypt data that arrived in the
    /// same read as the packet that switched encryption on.
    pub fn buffered_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..]
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn compression_threshold(&self) -> Option<usize> {
        self.compression_threshold
    }

    /// Set the threshold for frames read and written from now on.
    pub fn set_compression_threshold(&mut self, threshold: Option<usize>) {
        self.compression_threshold = threshold;
    }

    /// Pop the next complete frame, or `Ok(None)` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>, ProtoError> {
        let (length, header) = match VarInt::peek(&self.buffer)? {
            Some(v) => v,
            None => return Ok(None),
        };
        if length <= 0 {
            return Err(ProtoError::NegativeLength(length));
        }
        let length = length as usize;
        if length > self.max_frame_length {
            return Err(ProtoError::FrameTooLarge {
                length,
                max: self.max_frame_length,
            });
        }
        if self.buffer.len() < header + length {
            return Ok(None);
        }

        self.buffer.advance(header);
        let mut payload = self.buffer.split_to(length).freeze();

        if let Some(threshold) = self.compression_threshold {
            let data_length = VarInt::proto_decode(&mut payload)?.0;
            if data_length < 0 {
                return Err(ProtoError::NegativeLength(data_length));
            }
            if data_length != 0 {
                let data_length = data_length as usize;
                if data_length < threshold {
                    return Err(ProtoError::BadCompressedLength(format!(
                        "{data_length} bytes is below the threshold of {threshold}"
                    )));
                }
                payload = Bytes::from(compression::decompress(&payload, data_length)?);
            }
        }

        let id = VarInt::proto_decode(&mut payload)?.0;
        Ok(Some(RawFrame { id, body: payload }))
    }

    /// Serialize `packet` as one frame onto `out`.
    pub fn encode(&self, packet: &GamePacket, out: &mut BytesMut) -> Result<(), ProtoError> {
        let mut inner = BytesMut::new();
        VarInt(packet.id()).proto_encode(&mut inner)?;
        packet.encode_body(&mut inner)?;
        self.write_frame(&inner, out)
    }

    fn write_frame(&self, data: &[u8], out: &mut BytesMut) -> Result<(), ProtoError> {
        match self.compression_threshold {
            None => {
                self.check_length(data.len())?;
                VarInt(data.len() as i32).proto_encode(out)?;
                out.put_slice(data);
            }
            Some(threshold) if data.len() >= threshold => {
                let compressed = compression::compress(data, COMPRESSION_LEVEL)?;
                let total = VarInt::encoded_len(data.len() as i32) + compressed.len();
                self.check_length(total)?;
                VarInt(total as i32).proto_encode(out)?;
                VarInt(data.len() as i32).proto_encode(out)?;
                out.put_slice(&compressed);
            }
            Some(_) => {
                let total = 1 + data.len();
                self.check_length(total)?;
                VarInt(total as i32).proto_encode(out)?;
                out.put_u8(0);
                out.put_slice(data);
            }
        }
        Ok(())
    }

    fn check_length(&self, length: usize) -> Result<(), ProtoError> {
        if length > self.max_frame_length {
            return Err(ProtoError::FrameTooLarge {
                length,
                max: self.max_frame_length,
            });
        }
        Ok(())
    }
}
