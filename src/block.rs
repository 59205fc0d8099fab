//! Block framing.
//!
//! ## Public invariants (must not change without a migration)
//!
//! - **Framing**: `[length:i64 big-endian][checksum:16][payload:length]`.
//! - **Checksum**: MD5 over `payload || length` (payload first, then the 8 length bytes).
//! - The header is validated before the payload is trusted; any mismatch is
//!   reported as [`WalError::Corrupt`], never as a silently shorter buffer.

use crate::error::{WalError, WalResult};
use crate::formats::{BLOCK_HEADER_SIZE, CHECKSUM_SIZE};
use byteorder::{BigEndian, ByteOrder};
use md5::{Digest, Md5};

fn checksum(payload: &[u8], length: &[u8; 8]) -> [u8; CHECKSUM_SIZE] {
    let mut hasher = Md5::new();
    hasher.update(payload);
    hasher.update(length);
    hasher.finalize().into()
}

/// Total encoded size of a block carrying `payload_len` bytes.
pub fn encoded_len(payload_len: usize) -> usize {
    BLOCK_HEADER_SIZE + payload_len
}

/// Encode a payload into a self-describing block.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut length = [0u8; 8];
    BigEndian::write_i64(&mut length, payload.len() as i64);

    let mut out = Vec::with_capacity(encoded_len(payload.len()));
    out.extend_from_slice(&length);
    out.extend_from_slice(&checksum(payload, &length));
    out.extend_from_slice(payload);
    out
}

/// Decode the block at the start of `buf`.
///
/// Returns the payload slice and the number of bytes consumed (header + payload),
/// so a buffer of consecutive blocks can be walked by re-decoding the tail.
pub fn decode(buf: &[u8]) -> WalResult<(&[u8], usize)> {
    decode_at(buf, 0)
}

fn decode_at(buf: &[u8], offset: usize) -> WalResult<(&[u8], usize)> {
    if buf.len() < BLOCK_HEADER_SIZE {
        return Err(WalError::corrupt(offset, "truncated block header"));
    }
    let mut length = [0u8; 8];
    length.copy_from_slice(&buf[..8]);
    let payload_len = BigEndian::read_i64(&length);
    let available = buf.len() - BLOCK_HEADER_SIZE;
    let payload_len = match usize::try_from(payload_len) {
        Ok(n) if n <= available => n,
        _ => {
            return Err(WalError::corrupt(
                offset,
                format!("block length {payload_len} exceeds {available} available bytes"),
            ))
        }
    };

    let payload = &buf[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + payload_len];
    if checksum(payload, &length)[..] != buf[8..BLOCK_HEADER_SIZE] {
        return Err(WalError::corrupt(offset, "checksum mismatch"));
    }
    Ok((payload, BLOCK_HEADER_SIZE + payload_len))
}

/// Iterator over consecutive blocks in a buffer.
///
/// Yields `(byte range of the whole block, payload)`; stops after the first error.
pub struct Blocks<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Blocks<'a> {
    /// Walk `buf` from the start.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for Blocks<'a> {
    type Item = WalResult<(std::ops::Range<usize>, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        match decode_at(&self.buf[self.pos..], self.pos) {
            Ok((payload, consumed)) => {
                let range = self.pos..self.pos + consumed;
                self.pos += consumed;
                Some(Ok((range, payload)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
