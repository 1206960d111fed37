//! Consensus byte codec.
//!
//! All multi-byte integers are little-endian. Byte strings are prefixed with
//! a `u32` length. Collection counts are `u32` and are sanity-checked against
//! the number of remaining input bytes before any allocation happens, so a
//! hostile count cannot trigger a huge reservation.
//!
//! Decoding is strict: [`Decodable::decode`] rejects trailing bytes, and a
//! re-encoded value always reproduces the exact input byte sequence.

use crate::constants::MAX_BLOCK_SIZE;
use crate::error::CodecError;

/// Cursor over an input byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes left to consume.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                needed: n - self.remaining(),
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    pub fn read_array32(&mut self) -> Result<[u8; 32], CodecError> {
        let bytes = self.take(32)?;
        Ok(bytes.try_into().expect("32-byte slice"))
    }

    /// Read a `u32`-length-prefixed byte string.
    pub fn read_varbytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u32()? as usize;
        if len > MAX_BLOCK_SIZE {
            return Err(CodecError::OversizedField {
                len,
                max: MAX_BLOCK_SIZE,
            });
        }
        Ok(self.take(len)?.to_vec())
    }

    /// Read a collection count, checked against the remaining input assuming
    /// each element occupies at least `min_element_size` bytes.
    pub fn read_count(&mut self, min_element_size: usize) -> Result<usize, CodecError> {
        let count = self.read_u32()? as usize;
        if count.saturating_mul(min_element_size) > self.remaining() {
            return Err(CodecError::OversizedCount {
                count,
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_varbytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

/// A value with a canonical consensus encoding.
pub trait Encodable {
    fn encode_into(&self, out: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }
}

/// A value decodable from its canonical consensus encoding.
pub trait Decodable: Sized {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError>;

    /// Decode a complete value from `bytes`, rejecting trailing garbage.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let value = Self::decode_from(&mut reader)?;
        if !reader.is_empty() {
            return Err(CodecError::TrailingBytes(reader.remaining()));
        }
        Ok(value)
    }
}
