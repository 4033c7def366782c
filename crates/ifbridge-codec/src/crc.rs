//! Payload checksum capability.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

/// Trailer length appended by [`seal`].
pub const CHECKSUM_LEN: usize = 4;

/// Computes payload checksums for interfaces that carry them.
pub trait Checksum: Send + Sync {
    fn compute(&self, data: &[u8]) -> u32;

    fn verify(&self, data: &[u8], expected: u32) -> bool {
        self.compute(data) == expected
    }
}

/// CRC-32 (IEEE), as computed by `crc32fast`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32;

impl Checksum for Crc32 {
    fn compute(&self, data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

/// Append the little-endian checksum of `data`.
pub fn seal(checksum: &dyn Checksum, data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() + CHECKSUM_LEN);
    out.put_slice(data);
    out.put_u32_le(checksum.compute(data));
    out.freeze()
}

/// Verify and strip a trailing checksum. The returned payload shares `sealed`'s buffer.
pub fn unseal(checksum: &dyn Checksum, sealed: &Bytes) -> Result<Bytes> {
    if sealed.len() < CHECKSUM_LEN {
        return Err(CodecError::InvalidReply(format!(
            "payload of {} bytes is too short for a checksum",
            sealed.len()
        )));
    }

    let split = sealed.len() - CHECKSUM_LEN;
    let data = sealed.slice(..split);
    let tail = &sealed[split..];
    let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    if !checksum.verify(&data, expected) {
        return Err(CodecError::ChecksumMismatch {
            expected,
            computed: checksum.compute(&data),
        });
    }
    Ok(data)
}
