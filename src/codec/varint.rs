//! Order-preserving variable-length integer encoding.
//!
//! The encoding is chosen so that the byte-wise lexicographic order of two
//! encoded values always agrees with their numeric order. The backing engine
//! compares keys byte-wise, so every key field must satisfy this property
//! for range scans to agree with numeric bounds.
//!
//! Layout, selected by the first byte `a0`:
//!
//! * `0..=240`: one byte, the value itself.
//! * `241..=248`: two bytes, `240 + 256*(a0-241) + a1`, values `241..=2287`.
//! * `249`: three bytes, `2288 + 256*a1 + a2`, values `2288..=67823`.
//! * `250..=255`: `a0-247` big-endian payload bytes (3..=8) follow,
//!   covering everything up to `u64::MAX`.

use crate::error::{Result, StoreError};

/// Maximum encoded length of a single value.
pub const MAX_VARINT_LEN: usize = 9;

/// Appends the encoding of `value` to `out`.
pub fn write(out: &mut Vec<u8>, value: u64) {
    if value <= 240 {
        out.push(value as u8);
    } else if value <= 2287 {
        let v = value - 240;
        out.push((v >> 8) as u8 + 241);
        out.push((v & 0xff) as u8);
    } else if value <= 67823 {
        let v = value - 2288;
        out.push(249);
        out.push((v >> 8) as u8);
        out.push((v & 0xff) as u8);
    } else {
        let n = significant_bytes(value);
        out.push(250 + (n as u8 - 3));
        for i in (0..n).rev() {
            out.push((value >> (8 * i)) as u8);
        }
    }
}

/// Number of bytes `write` would append for `value`.
pub fn encoded_len(value: u64) -> usize {
    if value <= 240 {
        1
    } else if value <= 2287 {
        2
    } else if value <= 67823 {
        3
    } else {
        1 + significant_bytes(value)
    }
}

/// Total encoded length implied by the first byte.
pub fn len_from_first(first: u8) -> usize {
    match first {
        0..=240 => 1,
        241..=248 => 2,
        249 => 3,
        _ => first as usize - 247 + 1,
    }
}

/// Decodes one value from the front of `buf`, returning it together with the
/// number of bytes consumed.
pub fn read(buf: &[u8]) -> Result<(u64, usize)> {
    let first = *buf.first().ok_or(StoreError::Corruption("truncated varint"))?;
    let len = len_from_first(first);
    if buf.len() < len {
        return Err(StoreError::Corruption("truncated varint"));
    }
    let value = match first {
        0..=240 => u64::from(first),
        241..=248 => 240 + ((u64::from(first) - 241) << 8) + u64::from(buf[1]),
        249 => 2288 + (u64::from(buf[1]) << 8) + u64::from(buf[2]),
        _ => {
            let mut v = 0u64;
            for &b in &buf[1..len] {
                v = v << 8 | u64::from(b);
            }
            v
        }
    };
    Ok((value, len))
}

/// Number of big-endian bytes needed for the magnitude of `value`, at least 3
/// (values needing fewer use the short forms above).
fn significant_bytes(value: u64) -> usize {
    let bytes = (64 - value.leading_zeros() as usize).div_ceil(8);
    bytes.max(3)
}

/// A cursor over a sequence of concatenated varints.
pub struct VarintReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> VarintReader<'a> {
    pub fn new(buf: &'a [u8]) -> VarintReader<'a> {
        VarintReader { buf, pos: 0 }
    }

    pub fn next(&mut self) -> Result<u64> {
        let (value, len) = read(&self.buf[self.pos..])?;
        self.pos += len;
        Ok(value)
    }

    /// Skips one value without decoding it.
    pub fn skip(&mut self) -> Result<()> {
        let first = *self
            .buf
            .get(self.pos)
            .ok_or(StoreError::Corruption("truncated varint"))?;
        self.pos += len_from_first(first);
        if self.pos > self.buf.len() {
            return Err(StoreError::Corruption("truncated varint"));
        }
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}
