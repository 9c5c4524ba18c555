//! Byte-level serialization of terms and term-table keys.
//!
//! Every entry in the term table is marked by its first byte. Keys use
//! `ID_KEY` (ID → data) and `HASH_KEY` (content hash → ID, for oversized
//! data); stored data uses one discriminator per term kind plus one for
//! interned namespaces.

use crate::codec::varint;
use crate::error::{Result, StoreError};

/// Keyspace marker: `ID_KEY ++ varint(serial)` maps to the term data.
pub const ID_KEY: u8 = 0x00;
/// Keyspace marker: `HASH_KEY ++ varint(crc32) ++ varint(n)` maps to an ID key.
pub const HASH_KEY: u8 = 0x01;
/// Data discriminator for IRIs.
pub const IRI_DATA: u8 = 0x02;
/// Data discriminator for blank nodes.
pub const BNODE_DATA: u8 = 0x03;
/// Data discriminator for literals.
pub const LITERAL_DATA: u8 = 0x04;
/// Data discriminator for interned namespaces.
pub const NAMESPACE_DATA: u8 = 0x05;

/// Serialized data of this length or more is keyed by content hash instead
/// of by the raw bytes (two 64-bit fields' worth).
pub const MAX_INLINE_KEY: usize = 16;

/// Datatype slot value meaning "no datatype". Serial numbers start at 1, so
/// no stored term ever has raw ID 0.
pub const NO_DATATYPE: u64 = 0;

pub fn write_id_key(out: &mut Vec<u8>, serial: u64) {
    out.push(ID_KEY);
    varint::write(out, serial);
}

/// Decodes the serial from an `ID_KEY` key or an ID value payload.
pub fn read_id_key(data: &[u8]) -> Result<u64> {
    match data.split_first() {
        Some((&ID_KEY, rest)) => Ok(varint::read(rest)?.0),
        _ => Err(StoreError::Corruption("malformed term id key")),
    }
}

pub fn write_hash_prefix(out: &mut Vec<u8>, hash: u32) {
    out.push(HASH_KEY);
    varint::write(out, u64::from(hash));
}

pub fn write_hash_key(out: &mut Vec<u8>, hash: u32, n: u64) {
    write_hash_prefix(out, hash);
    varint::write(out, n);
}

/// Splits an IRI into namespace and local name at the last `#`, `/`, or `:`.
/// IRIs without any separator intern wholly as a namespace with an empty
/// local name.
pub fn split_iri(iri: &str) -> (&str, &str) {
    match iri.rfind(['#', '/', ':']) {
        Some(idx) => iri.split_at(idx + 1),
        None => (iri, ""),
    }
}

pub fn write_iri(out: &mut Vec<u8>, ns_serial: u64, local: &str) {
    out.push(IRI_DATA);
    varint::write(out, ns_serial);
    out.extend_from_slice(local.as_bytes());
}

pub fn write_bnode(out: &mut Vec<u8>, label: &str) {
    out.push(BNODE_DATA);
    out.extend_from_slice(label.as_bytes());
}

/// Serializes a literal. `datatype_raw` is the raw tagged ID of the datatype
/// IRI, or [`NO_DATATYPE`]. Language tags longer than 255 bytes are invalid.
pub fn write_literal(
    out: &mut Vec<u8>,
    datatype_raw: u64,
    lang: Option<&str>,
    label: &str,
) -> Result<()> {
    let lang_bytes = lang.map(str::as_bytes).unwrap_or_default();
    if lang_bytes.len() > u8::MAX as usize {
        return Err(StoreError::Invalid(format!(
            "language tag exceeds 255 bytes: {} bytes",
            lang_bytes.len()
        )));
    }
    out.push(LITERAL_DATA);
    varint::write(out, datatype_raw);
    out.push(lang_bytes.len() as u8);
    out.extend_from_slice(lang_bytes);
    out.extend_from_slice(label.as_bytes());
    Ok(())
}

pub fn write_namespace(out: &mut Vec<u8>, namespace: &str) {
    out.push(NAMESPACE_DATA);
    out.extend_from_slice(namespace.as_bytes());
}

/// A borrowed view of decoded term data.
#[derive(Debug, PartialEq, Eq)]
pub enum TermData<'a> {
    Iri { ns_serial: u64, local: &'a str },
    BNode { label: &'a str },
    Literal {
        datatype_raw: u64,
        lang: Option<&'a str>,
        label: &'a str,
    },
    Namespace { namespace: &'a str },
}

/// Decodes stored term data.
///
/// Literals that fail the strict layout (a language length running past the
/// payload) are re-decoded under the legacy rule (no language byte, the
/// remainder is the label) so data written by earlier formats resolves
/// instead of erroring.
pub fn parse(data: &[u8]) -> Result<TermData<'_>> {
    let (&marker, rest) = data
        .split_first()
        .ok_or(StoreError::Corruption("empty term data"))?;
    match marker {
        IRI_DATA => {
            let (ns_serial, used) = varint::read(rest)?;
            let local = as_utf8(&rest[used..])?;
            Ok(TermData::Iri { ns_serial, local })
        }
        BNODE_DATA => Ok(TermData::BNode {
            label: as_utf8(rest)?,
        }),
        LITERAL_DATA => {
            let (datatype_raw, used) = varint::read(rest)?;
            let tail = &rest[used..];
            match parse_literal_tail(tail) {
                Some((lang, label)) => Ok(TermData::Literal {
                    datatype_raw,
                    lang,
                    label,
                }),
                // Legacy layout: no language-length byte at all.
                None => Ok(TermData::Literal {
                    datatype_raw,
                    lang: None,
                    label: as_utf8(tail)?,
                }),
            }
        }
        NAMESPACE_DATA => Ok(TermData::Namespace {
            namespace: as_utf8(rest)?,
        }),
        _ => Err(StoreError::Corruption("unknown term data discriminator")),
    }
}

fn parse_literal_tail(tail: &[u8]) -> Option<(Option<&str>, &str)> {
    let (&lang_len, rest) = tail.split_first()?;
    let lang_len = lang_len as usize;
    if lang_len > rest.len() {
        return None;
    }
    let lang = std::str::from_utf8(&rest[..lang_len]).ok()?;
    let label = std::str::from_utf8(&rest[lang_len..]).ok()?;
    Some(((lang_len > 0).then_some(lang), label))
}

fn as_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| StoreError::Corruption("term data is not valid UTF-8"))
}
