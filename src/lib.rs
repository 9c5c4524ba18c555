//! Tetrad is an embedded, transactional storage engine for RDF-like quads
//! (subject, predicate, object, graph) over LMDB.
//!
//! Terms are interned into tagged 64-bit IDs by the [`term`] store; the
//! quad set is kept in several sorted key permutations by the [`index`]
//! store so any bound/unbound pattern resolves to a range scan; the [`txn`]
//! manager pools versioned read snapshots and grows the memory map behind a
//! stop-the-world barrier; the [`writer`] serializes all mutation behind a
//! single logical writer with transparent map-full recovery.
//!
//! ```no_run
//! use tetrad::{QuadPattern, QuadStore, StoreOptions, Term};
//!
//! # fn main() -> tetrad::Result<()> {
//! let store = QuadStore::open(StoreOptions::new("/tmp/quads"))?;
//!
//! let mut writer = store.begin_write()?;
//! writer.add(
//!     &Term::iri("http://example.org/alice"),
//!     &Term::iri("http://xmlns.com/foaf/0.1/name"),
//!     &Term::literal("Alice"),
//!     None,
//!     true,
//! )?;
//! writer.commit()?;
//!
//! let subject = store.id_of(&Term::iri("http://example.org/alice"))?;
//! let pattern = QuadPattern::new(Some(subject), None, None, None);
//! for quad in store.scan(&pattern, &[], None) {
//!     let quad = quad?;
//!     println!("{:?}", store.term_of(quad.object)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod index;
pub mod model;
pub mod pool;
pub mod store;
pub mod term;
pub mod txn;
pub mod writer;

pub use error::{Result, StoreError};
pub use index::iter::{IterCloser, RecordIterator};
pub use index::{FieldOrder, IndexStore};
pub use model::{
    Field, Quad, QuadPattern, Term, TermId, TermKind, DEFAULT_GRAPH_ID, UNKNOWN_ID,
};
pub use store::{QuadStore, ScanIterator, StoreOptions, FORMAT_VERSION};
pub use term::TermStore;
pub use writer::{PipelinedWriter, StoreWriter};
