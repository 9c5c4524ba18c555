//! The term table: interning of IRIs, blank nodes, and literals to tagged
//! 64-bit IDs, and resolution back to terms.
//!
//! All entries live in one named database. Short serialized data doubles as
//! its own reverse-lookup key; anything at or past the inline threshold is
//! reached through a crc32 hash bucket chain instead. IRI namespaces are
//! interned separately and referenced by serial from each IRI entry, so a
//! vocabulary's prefix is stored once.
//!
//! A single serial counter feeds both terms and namespaces. Serials start
//! at 1; the counter is recovered on open by scanning backwards over the
//! ID keyspace.

pub mod cache;
pub mod encode;

use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use heed::types::Bytes;
use heed::{Database, Env, RoTxn, RwTxn};
use parking_lot::Mutex;
use tracing::debug;

use crate::codec::varint;
use crate::error::{Result, StoreError};
use crate::model::{Term, TermId, TermKind, UNKNOWN_ID, XSD_STRING};
use cache::DirectCache;
use encode::{TermData, MAX_INLINE_KEY, NO_DATATYPE};

const TERM_CACHE_SIZE: usize = 512;
const TERM_ID_CACHE_SIZE: usize = 128;
const NAMESPACE_CACHE_SIZE: usize = 64;
const NAMESPACE_ID_CACHE_SIZE: usize = 32;

struct Caches {
    by_id: DirectCache<u64, Term>,
    by_term: DirectCache<Term, TermId>,
    ns_by_serial: DirectCache<u64, String>,
    ns_by_name: DirectCache<String, u64>,
}

impl Caches {
    fn new() -> Caches {
        Caches {
            by_id: DirectCache::new(TERM_CACHE_SIZE),
            by_term: DirectCache::new(TERM_ID_CACHE_SIZE),
            ns_by_serial: DirectCache::new(NAMESPACE_CACHE_SIZE),
            ns_by_name: DirectCache::new(NAMESPACE_ID_CACHE_SIZE),
        }
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_term.clear();
        self.ns_by_serial.clear();
        self.ns_by_name.clear();
    }
}

pub struct TermStore {
    db: Database<Bytes, Bytes>,
    next_serial: AtomicU64,
    revision: AtomicU64,
    caches: Mutex<Caches>,
}

impl TermStore {
    /// Opens (creating if needed) the term database and recovers the serial
    /// counter from existing entries.
    pub fn open(env: &Env, wtxn: &mut RwTxn) -> Result<TermStore> {
        let db = env.create_database(wtxn, Some("terms"))?;
        let store = TermStore {
            db,
            next_serial: AtomicU64::new(1),
            revision: AtomicU64::new(0),
            caches: Mutex::new(Caches::new()),
        };
        store.recover_next_serial(wtxn)?;
        Ok(store)
    }

    /// Bumped whenever the table is cleared; an ID resolved under an older
    /// revision must not be trusted.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Resolves a term to its tagged ID, or [`UNKNOWN_ID`] if it was never
    /// interned. Never writes.
    pub fn id_of(&self, txn: &RoTxn, term: &Term) -> Result<TermId> {
        if let Some(id) = self.caches.lock().by_term.get(term) {
            return Ok(id);
        }
        let Some(data) = self.encode_existing(txn, term)? else {
            return Ok(UNKNOWN_ID);
        };
        let Some(serial) = self.find_serial(txn, &data)? else {
            return Ok(UNKNOWN_ID);
        };
        let id = TermId::from_serial(serial, term.kind());
        self.caches.lock().by_term.put(term.clone(), id);
        Ok(id)
    }

    /// Interns a term, assigning a fresh serial if it is new. Must run under
    /// the store's writer lock.
    pub fn intern(&self, wtxn: &mut RwTxn, term: &Term) -> Result<TermId> {
        let existing = self.id_of(wtxn, term)?;
        if !existing.is_unknown() {
            return Ok(existing);
        }
        let data = self.encode_interning(wtxn, term)?;
        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
        self.store_data(wtxn, serial, &data)?;
        let id = TermId::from_serial(serial, term.kind());
        let mut caches = self.caches.lock();
        caches.by_term.put(term.clone(), id);
        caches.by_id.put(id.0, term.clone());
        Ok(id)
    }

    /// Resolves a tagged ID back to its term. Pointer-tagged, unknown, and
    /// never-assigned IDs all yield `None`.
    pub fn term_of(&self, txn: &RoTxn, id: TermId) -> Result<Option<Term>> {
        if id.is_unknown() || id.kind() == TermKind::Pointer {
            return Ok(None);
        }
        if let Some(term) = self.caches.lock().by_id.get(&id.0) {
            return Ok(Some(term));
        }
        let Some(data) = self.get_data(txn, id.serial())? else {
            return Ok(None);
        };
        let term = match encode::parse(data)? {
            TermData::Iri { ns_serial, local } => {
                let namespace = self
                    .namespace_of(txn, ns_serial)?
                    .ok_or(StoreError::Corruption("iri references a missing namespace"))?;
                Term::Iri(format!("{namespace}{local}"))
            }
            TermData::BNode { label } => Term::bnode(label),
            TermData::Literal {
                datatype_raw,
                lang,
                label,
            } => {
                let datatype = if datatype_raw == NO_DATATYPE {
                    None
                } else {
                    match self.term_of(txn, TermId(datatype_raw))? {
                        Some(Term::Iri(iri)) => Some(iri),
                        _ => {
                            return Err(StoreError::Corruption(
                                "literal references a missing datatype",
                            ))
                        }
                    }
                };
                Term::Literal {
                    label: label.to_string(),
                    lang: lang.map(str::to_string),
                    datatype,
                }
            }
            TermData::Namespace { .. } => return Ok(None),
        };
        if term.kind() != id.kind() {
            return Ok(None);
        }
        self.caches.lock().by_id.put(id.0, term.clone());
        Ok(Some(term))
    }

    /// Drops every term and namespace, resets the serial counter, and bumps
    /// the table revision.
    pub fn clear(&self, wtxn: &mut RwTxn) -> Result<()> {
        self.db.clear(wtxn)?;
        self.next_serial.store(1, Ordering::SeqCst);
        self.revision.fetch_add(1, Ordering::Release);
        self.caches.lock().clear();
        debug!("cleared term table");
        Ok(())
    }

    /// Serializes `term` for lookup. `None` when a referenced namespace or
    /// datatype is not interned, which implies the term itself is unknown.
    fn encode_existing(&self, txn: &RoTxn, term: &Term) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();
        match term {
            Term::Iri(iri) => {
                let (namespace, local) = encode::split_iri(iri);
                let Some(ns_serial) = self.namespace_serial(txn, namespace)? else {
                    return Ok(None);
                };
                encode::write_iri(&mut out, ns_serial, local);
            }
            Term::BlankNode(label) => encode::write_bnode(&mut out, label),
            Term::Literal {
                label,
                lang,
                datatype,
            } => {
                let datatype_raw = match effective_datatype(datatype.as_deref()) {
                    Some(dt) => {
                        let id = self.id_of(txn, &Term::iri(dt))?;
                        if id.is_unknown() {
                            return Ok(None);
                        }
                        id.0
                    }
                    None => NO_DATATYPE,
                };
                encode::write_literal(&mut out, datatype_raw, lang.as_deref(), label)?;
            }
        }
        Ok(Some(out))
    }

    /// Serializes `term` for interning, creating namespace and datatype
    /// entries as needed.
    fn encode_interning(&self, wtxn: &mut RwTxn, term: &Term) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match term {
            Term::Iri(iri) => {
                let (namespace, local) = encode::split_iri(iri);
                let ns_serial = self.intern_namespace(wtxn, namespace)?;
                encode::write_iri(&mut out, ns_serial, local);
            }
            Term::BlankNode(label) => encode::write_bnode(&mut out, label),
            Term::Literal {
                label,
                lang,
                datatype,
            } => {
                let datatype_raw = match effective_datatype(datatype.as_deref()) {
                    Some(dt) => self.intern(wtxn, &Term::iri(dt))?.0,
                    None => NO_DATATYPE,
                };
                encode::write_literal(&mut out, datatype_raw, lang.as_deref(), label)?;
            }
        }
        Ok(out)
    }

    fn namespace_serial(&self, txn: &RoTxn, namespace: &str) -> Result<Option<u64>> {
        if let Some(serial) = self.caches.lock().ns_by_name.get(&namespace.to_string()) {
            return Ok(Some(serial));
        }
        let mut data = Vec::with_capacity(1 + namespace.len());
        encode::write_namespace(&mut data, namespace);
        let found = self.find_serial(txn, &data)?;
        if let Some(serial) = found {
            let mut caches = self.caches.lock();
            caches.ns_by_name.put(namespace.to_string(), serial);
            caches.ns_by_serial.put(serial, namespace.to_string());
        }
        Ok(found)
    }

    fn intern_namespace(&self, wtxn: &mut RwTxn, namespace: &str) -> Result<u64> {
        if let Some(serial) = self.namespace_serial(wtxn, namespace)? {
            return Ok(serial);
        }
        let mut data = Vec::with_capacity(1 + namespace.len());
        encode::write_namespace(&mut data, namespace);
        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
        self.store_data(wtxn, serial, &data)?;
        let mut caches = self.caches.lock();
        caches.ns_by_name.put(namespace.to_string(), serial);
        caches.ns_by_serial.put(serial, namespace.to_string());
        Ok(serial)
    }

    fn namespace_of(&self, txn: &RoTxn, serial: u64) -> Result<Option<String>> {
        if let Some(namespace) = self.caches.lock().ns_by_serial.get(&serial) {
            return Ok(Some(namespace));
        }
        let Some(data) = self.get_data(txn, serial)? else {
            return Ok(None);
        };
        let TermData::Namespace { namespace } = encode::parse(data)? else {
            return Err(StoreError::Corruption("expected namespace data"));
        };
        let namespace = namespace.to_string();
        let mut caches = self.caches.lock();
        caches.ns_by_serial.put(serial, namespace.clone());
        caches.ns_by_name.put(namespace.clone(), serial);
        Ok(Some(namespace))
    }

    /// Finds the serial under which `data` is stored, through the inline key
    /// or the hash bucket chain depending on its size.
    fn find_serial(&self, txn: &RoTxn, data: &[u8]) -> Result<Option<u64>> {
        if data.len() < MAX_INLINE_KEY {
            return match self.db.get(txn, data)? {
                Some(value) => Ok(Some(encode::read_id_key(value)?)),
                None => Ok(None),
            };
        }
        let mut prefix = Vec::with_capacity(1 + varint::MAX_VARINT_LEN);
        encode::write_hash_prefix(&mut prefix, crc32fast::hash(data));
        let range = (Bound::Included(&prefix[..]), Bound::Unbounded);
        let mut iter = self.db.range(txn, &range)?;
        let mut id_key = Vec::with_capacity(1 + varint::MAX_VARINT_LEN);
        while let Some(entry) = iter.next() {
            let (key, value) = entry?;
            if !key.starts_with(&prefix) {
                break;
            }
            let serial = encode::read_id_key(value)?;
            id_key.clear();
            encode::write_id_key(&mut id_key, serial);
            if self.db.get(txn, &id_key)? == Some(data) {
                return Ok(Some(serial));
            }
        }
        Ok(None)
    }

    /// Writes the forward entry and the reverse lookup entry for a freshly
    /// assigned serial.
    fn store_data(&self, wtxn: &mut RwTxn, serial: u64, data: &[u8]) -> Result<()> {
        let mut id_key = Vec::with_capacity(1 + varint::MAX_VARINT_LEN);
        encode::write_id_key(&mut id_key, serial);
        if data.len() < MAX_INLINE_KEY {
            self.db.put(wtxn, data, &id_key)?;
        } else {
            let hash = crc32fast::hash(data);
            let mut prefix = Vec::with_capacity(1 + varint::MAX_VARINT_LEN);
            encode::write_hash_prefix(&mut prefix, hash);
            let next_bucket = {
                let mut upper = prefix.clone();
                upper.extend_from_slice(&[0xff; varint::MAX_VARINT_LEN + 1]);
                let range = (Bound::Included(&prefix[..]), Bound::Excluded(&upper[..]));
                match self.db.rev_range(wtxn, &range)?.next() {
                    Some(entry) => {
                        let (key, _) = entry?;
                        varint::read(&key[prefix.len()..])?.0 + 1
                    }
                    None => 0,
                }
            };
            let mut bucket_key = Vec::with_capacity(prefix.len() + varint::MAX_VARINT_LEN);
            encode::write_hash_key(&mut bucket_key, hash, next_bucket);
            self.db.put(wtxn, &bucket_key, &id_key)?;
        }
        self.db.put(wtxn, &id_key, data)?;
        Ok(())
    }

    fn get_data<'t>(&self, txn: &'t RoTxn, serial: u64) -> Result<Option<&'t [u8]>> {
        let mut id_key = Vec::with_capacity(1 + varint::MAX_VARINT_LEN);
        encode::write_id_key(&mut id_key, serial);
        Ok(self.db.get(txn, &id_key)?)
    }

    /// Drops every cached entry. Required after a write transaction aborts:
    /// terms interned inside it were cached but rolled back on disk.
    pub(crate) fn reset_caches(&self) {
        self.caches.lock().clear();
    }

    /// The highest assigned serial sits at the tail of the ID keyspace,
    /// which sorts entirely below the first hash bucket key. Re-run after an
    /// aborted write transaction so replayed interning reassigns the same
    /// serials.
    pub(crate) fn recover_next_serial(&self, txn: &RoTxn) -> Result<()> {
        let hash_floor = [encode::HASH_KEY];
        let range = (Bound::Unbounded, Bound::Excluded(&hash_floor[..]));
        match self.db.rev_range(txn, &range)?.next() {
            Some(entry) => {
                let (key, _) = entry?;
                let serial = encode::read_id_key(key)?;
                self.next_serial.store(serial + 1, Ordering::SeqCst);
                debug!(next_serial = serial + 1, "recovered term serial counter");
            }
            None => self.next_serial.store(1, Ordering::SeqCst),
        }
        Ok(())
    }
}

/// `xsd:string` is the implied datatype of plain literals; encoding it away
/// keeps the two spellings of the same literal under one serial.
fn effective_datatype(datatype: Option<&str>) -> Option<&str> {
    datatype.filter(|dt| *dt != XSD_STRING)
}
