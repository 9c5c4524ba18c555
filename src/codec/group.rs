//! Packed encoding for fixed-arity tuples of unsigned values.
//!
//! A two-byte big-endian header packs one 3-bit length class per field
//! (`class = bytes - 1`, 1..=8 bytes), field 0 in the topmost bits. The
//! header is followed by the big-endian magnitude bytes of each field in
//! order. Any single field can be read, or compared against a constant,
//! without decoding the fields before it; only the fixed-size header is
//! consulted. For tuples of non-trivial values this is also more compact
//! than four independent varints.
//!
//! Unlike the single-value codec this encoding is *not* order-preserving
//! across fields; it is used for scratch records and value payloads, never
//! for index keys.

use crate::error::{Result, StoreError};

/// Bytes occupied by the packed header.
pub const HEADER_LEN: usize = 2;

fn magnitude_bytes(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn write_tuple(out: &mut Vec<u8>, values: &[u64]) {
    debug_assert!(values.len() == 4 || values.len() == 5);
    let mut header = 0u16;
    for (i, &v) in values.iter().enumerate() {
        let class = (magnitude_bytes(v) - 1) as u16;
        header |= class << (13 - 3 * i);
    }
    out.extend_from_slice(&header.to_be_bytes());
    for &v in values {
        let n = magnitude_bytes(v);
        for i in (0..n).rev() {
            out.push((v >> (8 * i)) as u8);
        }
    }
}

fn field_len(header: u16, i: usize) -> usize {
    ((header >> (13 - 3 * i)) & 0x7) as usize + 1
}

fn read_header(buf: &[u8]) -> Result<u16> {
    if buf.len() < HEADER_LEN {
        return Err(StoreError::Corruption("truncated group header"));
    }
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}

fn read_tuple(buf: &[u8], out: &mut [u64]) -> Result<usize> {
    let header = read_header(buf)?;
    let mut pos = HEADER_LEN;
    for (i, slot) in out.iter_mut().enumerate() {
        let n = field_len(header, i);
        let bytes = buf
            .get(pos..pos + n)
            .ok_or(StoreError::Corruption("truncated group payload"))?;
        let mut v = 0u64;
        for &b in bytes {
            v = v << 8 | u64::from(b);
        }
        *slot = v;
        pos += n;
    }
    Ok(pos)
}

/// Appends the packed encoding of a 4-tuple to `out`.
pub fn write4(out: &mut Vec<u8>, values: [u64; 4]) {
    write_tuple(out, &values);
}

/// Appends the packed encoding of a 5-tuple to `out`.
pub fn write5(out: &mut Vec<u8>, values: [u64; 5]) {
    write_tuple(out, &values);
}

/// Decodes a 4-tuple from the front of `buf`, returning the values and the
/// number of bytes consumed.
pub fn read4(buf: &[u8]) -> Result<([u64; 4], usize)> {
    let mut values = [0u64; 4];
    let used = read_tuple(buf, &mut values)?;
    Ok((values, used))
}

/// Decodes a 5-tuple from the front of `buf`.
pub fn read5(buf: &[u8]) -> Result<([u64; 5], usize)> {
    let mut values = [0u64; 5];
    let used = read_tuple(buf, &mut values)?;
    Ok((values, used))
}

/// Reads field `i` of an `arity`-tuple without decoding the others.
pub fn read_field(buf: &[u8], arity: usize, i: usize) -> Result<u64> {
    debug_assert!(i < arity && (arity == 4 || arity == 5));
    let header = read_header(buf)?;
    let mut pos = HEADER_LEN;
    for j in 0..i {
        pos += field_len(header, j);
    }
    let n = field_len(header, i);
    let bytes = buf
        .get(pos..pos + n)
        .ok_or(StoreError::Corruption("truncated group payload"))?;
    let mut v = 0u64;
    for &b in bytes {
        v = v << 8 | u64::from(b);
    }
    Ok(v)
}

/// Total encoded length of the tuple at the front of `buf`.
pub fn encoded_len(buf: &[u8], arity: usize) -> Result<usize> {
    let header = read_header(buf)?;
    let mut len = HEADER_LEN;
    for i in 0..arity {
        len += field_len(header, i);
    }
    if buf.len() < len {
        return Err(StoreError::Corruption("truncated group payload"));
    }
    Ok(len)
}
