//! Protocol encoding/decoding traits and helpers.
//!
//! All helpers are stateless: they read from or write to the supplied buffer
//! and advance its position, nothing else.

use bytes::{Buf, BufMut, Bytes};

use crate::error::ProtoError;
use crate::types::VarInt;

/// Default maximum length (in characters) for strings whose schema does not
/// declare a tighter bound.
pub const DEFAULT_MAX_STRING: usize = 32767;

/// Encode a value onto a buffer.
pub trait ProtoEncode {
    fn proto_encode(&self, buf: &mut impl BufMut) -> Result<(), ProtoError>;
}

/// Decode a value from a buffer.
pub trait ProtoDecode: Sized {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError>;
}

/// Read a VarInt length prefix, rejecting negative values.
fn read_length(buf: &mut impl Buf) -> Result<usize, ProtoError> {
    let len = VarInt::proto_decode(buf)?.0;
    if len < 0 {
        return Err(ProtoError::NegativeLength(len));
    }
    Ok(len as usize)
}

/// Write a protocol string (VarInt byte length + UTF-8).
///
/// `max_chars` is the schema bound for the field.
pub fn write_string(buf: &mut impl BufMut, s: &str, max_chars: usize) -> Result<(), ProtoError> {
    let chars = s.chars().count();
    if chars > max_chars {
        return Err(ProtoError::StringTooLong {
            length: chars,
            max: max_chars,
        });
    }
    VarInt(s.len() as i32).proto_encode(buf)?;
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Read a protocol string (VarInt byte length + UTF-8).
///
/// The declared byte length is checked against `max_chars * 4` before any
/// allocation, so a hostile prefix cannot force a large buffer.
pub fn read_string(buf: &mut impl Buf, max_chars: usize) -> Result<String, ProtoError> {
    let len = read_length(buf)?;
    if len > max_chars * 4 {
        return Err(ProtoError::StringTooLong {
            length: len,
            max: max_chars * 4,
        });
    }
    if buf.remaining() < len {
        return Err(ProtoError::TruncatedString {
            declared: len,
            available: buf.remaining(),
        });
    }
    let data = buf.copy_to_bytes(len);
    let s = String::from_utf8(data.to_vec()).map_err(|_| ProtoError::InvalidUtf8)?;
    let chars = s.chars().count();
    if chars > max_chars {
        return Err(ProtoError::StringTooLong {
            length: chars,
            max: max_chars,
        });
    }
    Ok(s)
}

/// Write a VarInt-prefixed byte array.
pub fn write_byte_array(buf: &mut impl BufMut, data: &[u8], max: usize) -> Result<(), ProtoError> {
    if data.len() > max {
        return Err(ProtoError::ArrayTooLong {
            length: data.len(),
            max,
        });
    }
    VarInt(data.len() as i32).proto_encode(buf)?;
    buf.put_slice(data);
    Ok(())
}

/// Read a VarInt-prefixed byte array.
pub fn read_byte_array(buf: &mut impl Buf, max: usize) -> Result<Bytes, ProtoError> {
    let len = read_length(buf)?;
    if len > max {
        return Err(ProtoError::ArrayTooLong { length: len, max });
    }
    ProtoError::ensure(buf.remaining(), len)?;
    Ok(buf.copy_to_bytes(len))
}

/// Read a big-endian `u16`.
pub fn read_u16(buf: &mut impl Buf) -> Result<u16, ProtoError> {
    ProtoError::ensure(buf.remaining(), 2)?;
    Ok(buf.get_u16())
}

/// Read a big-endian `i32`.
pub fn read_i32(buf: &mut impl Buf) -> Result<i32, ProtoError> {
    ProtoError::ensure(buf.remaining(), 4)?;
    Ok(buf.get_i32())
}

/// Read a big-endian `f32`.
pub fn read_f32(buf: &mut impl Buf) -> Result<f32, ProtoError> {
    ProtoError::ensure(buf.remaining(), 4)?;
    Ok(buf.get_f32())
}

/// Read a big-endian `f64`.
pub fn read_f64(buf: &mut impl Buf) -> Result<f64, ProtoError> {
    ProtoError::ensure(buf.remaining(), 8)?;
    Ok(buf.get_f64())
}

pub fn read_u8(buf: &mut impl Buf) -> Result<u8, ProtoError> {
    ProtoError::ensure(buf.remaining(), 1)?;
    Ok(buf.get_u8())
}

pub fn read_i8(buf: &mut impl Buf) -> Result<i8, ProtoError> {
    ProtoError::ensure(buf.remaining(), 1)?;
    Ok(buf.get_i8())
}

/// Read a boolean byte. Anything other than 0 or 1 is rejected.
pub fn read_bool(buf: &mut impl Buf) -> Result<bool, ProtoError> {
    match read_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtoError::InvalidData(format!("bad boolean byte {other:#04x}"))),
    }
}
