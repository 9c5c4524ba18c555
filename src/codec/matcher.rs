//! Partial-field equality tests over concatenated varint keys.
//!
//! A scan whose bound fields are not a contiguous prefix of the chosen index
//! permutation still has to check those fields on every visited key. The
//! matcher pre-encodes each bound constant once and then walks candidate
//! keys field by field, skipping unbound fields by their length byte and
//! comparing bound ones byte-wise, without decoding anything.

use smallvec::SmallVec;

use crate::codec::varint;

type Encoded = SmallVec<[u8; varint::MAX_VARINT_LEN]>;

/// Matches index keys against up to four pre-encoded field constants.
///
/// Constants are given in the key's field order, `None` meaning "any".
#[derive(Debug, Clone)]
pub struct KeyMatcher {
    fields: [Option<Encoded>; 4],
    /// True when every field is a wildcard; such a matcher accepts any key.
    trivial: bool,
}

impl KeyMatcher {
    pub fn new(constants: [Option<u64>; 4]) -> KeyMatcher {
        let fields = constants.map(|c| {
            c.map(|v| {
                let mut buf = Vec::with_capacity(varint::MAX_VARINT_LEN);
                varint::write(&mut buf, v);
                Encoded::from_slice(&buf)
            })
        });
        let trivial = fields.iter().all(|f| f.is_none());
        KeyMatcher { fields, trivial }
    }

    /// True when the matcher constrains no field.
    pub fn is_trivial(&self) -> bool {
        self.trivial
    }

    /// Tests `key` against the bound constants. Malformed keys never match.
    pub fn matches(&self, key: &[u8]) -> bool {
        if self.trivial {
            return true;
        }
        let mut pos = 0usize;
        for field in &self.fields {
            let Some(&first) = key.get(pos) else {
                return false;
            };
            let len = varint::len_from_first(first);
            match field {
                Some(expected) => {
                    let Some(actual) = key.get(pos..pos + len) else {
                        return false;
                    };
                    if expected.as_slice() != actual {
                        return false;
                    }
                }
                None => {
                    if pos + len > key.len() {
                        return false;
                    }
                }
            }
            pos += len;
        }
        true
    }
}
