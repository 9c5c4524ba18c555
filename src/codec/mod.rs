//! Binary codecs for keys and packed records.
//!
//! `varint` is the order-preserving single-value encoding used for every
//! index key field; `group` is the packed tuple encoding used for scratch
//! record batches; `matcher` performs partial-field equality checks over
//! concatenated varint keys.

pub mod group;
pub mod matcher;
pub mod varint;

pub use matcher::KeyMatcher;
