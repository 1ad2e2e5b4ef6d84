//! Zlib compression for frames once a compression threshold is negotiated.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::ProtoError;

/// Upper bound on the declared uncompressed size of a single packet.
pub const MAX_UNCOMPRESSED_LENGTH: usize = 8_388_608;

/// Compress `data` with zlib at the given level (0-9).
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>, ProtoError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| ProtoError::CompressError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| ProtoError::CompressError(e.to_string()))
}

/// Inflate `data`, requiring exactly `expected_len` bytes of output.
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>, ProtoError> {
    if expected_len > MAX_UNCOMPRESSED_LENGTH {
        return Err(ProtoError::BadCompressedLength(format!(
            "declared length {expected_len} exceeds {MAX_UNCOMPRESSED_LENGTH}"
        )));
    }
    let mut output = Vec::with_capacity(expected_len);
    // Read one byte past the declared size so an overlong stream is caught.
    ZlibDecoder::new(data)
        .take(expected_len as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|e| ProtoError::DecompressError(e.to_string()))?;
    if output.len() != expected_len {
        return Err(ProtoError::BadCompressedLength(format!(
            "declared {expected_len} bytes, inflated to {}",
            output.len()
        )));
    }
    Ok(output)
}
