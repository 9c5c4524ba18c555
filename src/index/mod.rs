//! Quad index permutations: N sorted tables over the same quad set, each
//! keyed by a different field order, so that any bound/unbound pattern can
//! be answered by a range scan over the permutation that pins the most
//! leading fields.
//!
//! Keys are the four field IDs varint-encoded in the permutation's order,
//! so byte-wise key comparison agrees with field-wise numeric comparison.
//! The stored value is a single flag byte.

pub mod iter;

use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use heed::types::Bytes;
use heed::{Database, Env, RoTxn, RwTxn};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::codec::varint::{self, VarintReader};
use crate::codec::KeyMatcher;
use crate::error::{Result, StoreError};
use crate::model::{Field, Quad};

/// Value bit 0: the quad was asserted explicitly rather than inferred.
pub const EXPLICIT_FLAG: u8 = 0x01;

/// Rows walked before cardinality estimation falls back to extrapolation.
const CARDINALITY_SAMPLE: u64 = 1024;

/// Quads materialized per read pass while removing or re-indexing inside a
/// write transaction.
const MUTATION_CHUNK: usize = 4096;

/// A permutation of the four quad fields, e.g. `spoc` or `posc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldOrder {
    fields: [Field; 4],
}

impl FieldOrder {
    /// Parses a 4-character permutation of `s`, `p`, `o`, `c`. Anything
    /// else is rejected here, before any table is touched.
    pub fn parse(s: &str) -> Result<FieldOrder> {
        let mut fields = [Field::Subject; 4];
        let mut seen = [false; 4];
        let mut n = 0;
        for c in s.chars() {
            let field = Field::from_symbol(c).ok_or_else(|| {
                StoreError::Invalid(format!("invalid field symbol {c:?} in field order {s:?}"))
            })?;
            if n == 4 || seen[field.pos()] {
                return Err(StoreError::Invalid(format!(
                    "field order {s:?} is not a permutation of \"spoc\""
                )));
            }
            seen[field.pos()] = true;
            fields[n] = field;
            n += 1;
        }
        if n != 4 {
            return Err(StoreError::Invalid(format!(
                "field order {s:?} is not a permutation of \"spoc\""
            )));
        }
        Ok(FieldOrder { fields })
    }

    pub fn fields(&self) -> [Field; 4] {
        self.fields
    }

    /// Name of the backing table for this permutation.
    pub fn table_name(&self) -> String {
        format!("idx_{self}")
    }

    /// Appends the key for `ids` (given in s,p,o,c order) to `out`.
    pub fn write_key(&self, out: &mut Vec<u8>, ids: [u64; 4]) {
        for field in self.fields {
            varint::write(out, ids[field.pos()]);
        }
    }

    /// Decodes a key back into s,p,o,c order.
    pub fn decode_key(&self, key: &[u8]) -> Result<[u64; 4]> {
        let mut reader = VarintReader::new(key);
        let mut ids = [0u64; 4];
        for field in self.fields {
            ids[field.pos()] = reader.next()?;
        }
        Ok(ids)
    }

    /// Number of leading key fields bound by `pattern` (s,p,o,c order),
    /// stopping at the first unbound field. Only these fields can narrow a
    /// range scan.
    pub fn score(&self, pattern: &[Option<u64>; 4]) -> usize {
        self.fields
            .iter()
            .take_while(|f| pattern[f.pos()].is_some())
            .count()
    }

    /// Lowest possible key for `pattern`: unbound fields take 0.
    pub fn write_min_key(&self, out: &mut Vec<u8>, pattern: &[Option<u64>; 4]) {
        for field in self.fields {
            varint::write(out, pattern[field.pos()].unwrap_or(0));
        }
    }

    /// Highest possible key for `pattern`: unbound fields take the maximum.
    pub fn write_max_key(&self, out: &mut Vec<u8>, pattern: &[Option<u64>; 4]) {
        for field in self.fields {
            varint::write(out, pattern[field.pos()].unwrap_or(u64::MAX));
        }
    }

    /// Matcher for the bound fields the range bounds cannot pin, i.e.
    /// everything past the first unbound key field. Trivial when the bound
    /// fields form a contiguous prefix.
    pub fn matcher(&self, pattern: &[Option<u64>; 4]) -> KeyMatcher {
        let score = self.score(pattern);
        let mut constants = [None; 4];
        for (i, field) in self.fields.iter().enumerate().skip(score) {
            constants[i] = pattern[field.pos()];
        }
        KeyMatcher::new(constants)
    }
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in self.fields {
            write!(f, "{}", field.symbol())?;
        }
        Ok(())
    }
}

impl FromStr for FieldOrder {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<FieldOrder> {
        FieldOrder::parse(s)
    }
}

/// One physical index table plus its field order.
#[derive(Clone, Copy)]
pub struct IndexPermutation {
    order: FieldOrder,
    db: Database<Bytes, Bytes>,
}

impl IndexPermutation {
    pub fn order(&self) -> FieldOrder {
        self.order
    }

    pub(crate) fn db(&self) -> Database<Bytes, Bytes> {
        self.db
    }

    pub fn len(&self, txn: &RoTxn) -> Result<u64> {
        Ok(self.db.len(txn)?)
    }
}

/// All registered permutations over one quad set.
///
/// Invariant: every permutation holds exactly the same (quad, flag) pairs;
/// the first registered permutation is the one probed on insert.
pub struct IndexStore {
    perms: Vec<IndexPermutation>,
}

impl IndexStore {
    /// Opens (creating if needed) one table per permutation. At least one
    /// permutation is required and duplicates are rejected.
    pub fn open(env: &Env, wtxn: &mut RwTxn, orders: &[FieldOrder]) -> Result<IndexStore> {
        validate_orders(orders)?;
        let mut perms = Vec::with_capacity(orders.len());
        for order in orders {
            let db = env.create_database(wtxn, Some(&order.table_name()))?;
            perms.push(IndexPermutation { order: *order, db });
        }
        Ok(IndexStore { perms })
    }

    pub fn orders(&self) -> Vec<FieldOrder> {
        self.perms.iter().map(|p| p.order).collect()
    }

    pub fn permutations(&self) -> &[IndexPermutation] {
        &self.perms
    }

    /// The permutation with the highest score for `pattern`; ties keep the
    /// first registered one. A score of 0 still scans, so this never fails.
    pub fn best_index(&self, pattern: &[Option<u64>; 4]) -> &IndexPermutation {
        let mut best = &self.perms[0];
        let mut best_score = best.order.score(pattern);
        for perm in &self.perms[1..] {
            let score = perm.order.score(pattern);
            if score > best_score {
                best = perm;
                best_score = score;
            }
        }
        best
    }

    /// Inserts a quad into every permutation. Returns whether the quad was
    /// new to the store. An explicit insert upgrades an inferred quad; an
    /// inferred insert never downgrades an explicit one.
    pub fn insert(&self, wtxn: &mut RwTxn, quad: &Quad, explicit: bool) -> Result<bool> {
        let ids = quad.ids();
        let primary = &self.perms[0];
        let mut key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
        primary.order.write_key(&mut key, ids);
        let stored = primary
            .db
            .get(wtxn, &key)?
            .map(|v| v.first().copied().unwrap_or(0));
        let was_new = stored.is_none();
        let rewrite = match stored {
            None => true,
            Some(flags) => explicit && flags & EXPLICIT_FLAG == 0,
        };
        if rewrite {
            let value = [if explicit { EXPLICIT_FLAG } else { 0 }];
            for perm in &self.perms {
                key.clear();
                perm.order.write_key(&mut key, ids);
                perm.db.put(wtxn, &key, &value)?;
            }
        }
        Ok(was_new)
    }

    /// Removes every quad matching `pattern` with the given explicit flag
    /// from all permutations. Returns removed counts per graph ID so the
    /// caller can maintain aggregate counts without rescanning.
    ///
    /// Matching keys are materialized in bounded chunks; each chunk is
    /// deleted before the scan resumes past its last key.
    pub fn remove_pattern(
        &self,
        wtxn: &mut RwTxn,
        pattern: &[Option<u64>; 4],
        explicit: bool,
    ) -> Result<FxHashMap<u64, u64>> {
        let perm = *self.best_index(pattern);
        let matcher = perm.order.matcher(pattern);
        let mut min_key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
        let mut max_key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
        perm.order.write_min_key(&mut min_key, pattern);
        perm.order.write_max_key(&mut max_key, pattern);

        let mut counts = FxHashMap::default();
        let mut resume: Option<Vec<u8>> = None;
        let mut chunk: Vec<[u64; 4]> = Vec::new();
        let mut key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
        loop {
            chunk.clear();
            {
                let lower = match &resume {
                    Some(k) => Bound::Excluded(&k[..]),
                    None => Bound::Included(&min_key[..]),
                };
                let range = (lower, Bound::Included(&max_key[..]));
                let mut entries = perm.db.range(wtxn, &range)?;
                while let Some(entry) = entries.next() {
                    let (raw, value) = entry?;
                    if !matcher.matches(raw) {
                        continue;
                    }
                    let flags = value.first().copied().unwrap_or(0);
                    if (flags & EXPLICIT_FLAG != 0) != explicit {
                        continue;
                    }
                    chunk.push(perm.order.decode_key(raw)?);
                    if chunk.len() >= MUTATION_CHUNK {
                        break;
                    }
                }
            }
            let Some(last) = chunk.last().copied() else {
                break;
            };
            for ids in &chunk {
                for p in &self.perms {
                    key.clear();
                    p.order.write_key(&mut key, *ids);
                    p.db.delete(wtxn, &key)?;
                }
                *counts.entry(ids[3]).or_insert(0) += 1;
            }
            if chunk.len() < MUTATION_CHUNK {
                break;
            }
            let mut resume_key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
            perm.order.write_key(&mut resume_key, last);
            resume = Some(resume_key);
        }
        debug!(
            removed = counts.values().sum::<u64>(),
            graphs = counts.len(),
            "removed quads by pattern"
        );
        Ok(counts)
    }

    /// Planner cardinality estimate for `pattern`.
    ///
    /// Exact for fully-bound patterns (0 or 1) and for fully-wildcard
    /// patterns (the table's entry count). Otherwise the range is walked up
    /// to a fixed sample; if the sample is exhausted, the remainder is
    /// extrapolated by an order of magnitude per key field left uncovered
    /// at the first difference between the sample boundary and the range
    /// end. A rough signal, not a count.
    pub fn cardinality(&self, txn: &RoTxn, pattern: &[Option<u64>; 4]) -> Result<f64> {
        let perm = self.best_index(pattern);
        if let [Some(s), Some(p), Some(o), Some(c)] = *pattern {
            let mut key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
            perm.order.write_key(&mut key, [s, p, o, c]);
            return Ok(if perm.db.get(txn, &key)?.is_some() {
                1.0
            } else {
                0.0
            });
        }
        if perm.order.score(pattern) == 0 {
            return Ok(perm.db.len(txn)? as f64);
        }

        let mut min_key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
        let mut max_key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
        perm.order.write_min_key(&mut min_key, pattern);
        perm.order.write_max_key(&mut max_key, pattern);
        let range = (Bound::Included(&min_key[..]), Bound::Included(&max_key[..]));

        let mut count = 0u64;
        let mut boundary: Option<Vec<u8>> = None;
        let mut entries = perm.db.range(txn, &range)?;
        while let Some(entry) = entries.next() {
            let (raw, _) = entry?;
            count += 1;
            if count >= CARDINALITY_SAMPLE {
                boundary = Some(raw.to_vec());
                break;
            }
        }
        drop(entries);
        let Some(boundary) = boundary else {
            return Ok(count as f64);
        };
        let Some(end) = perm.db.rev_range(txn, &range)?.next() else {
            return Ok(count as f64);
        };
        let (end_key, _) = end?;
        let diverged = first_divergent_field(&boundary, end_key)?;
        match diverged {
            Some(field) => Ok(count as f64 * 10f64.powi(4 - field as i32)),
            None => Ok(count as f64),
        }
    }

    /// Replaces the permutation set. Added permutations are populated by a
    /// chunked full scan of the current first permutation; removed ones are
    /// emptied. Must run inside the exclusive write transaction.
    pub fn reconfigure(
        &mut self,
        env: &Env,
        wtxn: &mut RwTxn,
        orders: &[FieldOrder],
    ) -> Result<()> {
        validate_orders(orders)?;
        let source = self.perms[0];
        let mut next = Vec::with_capacity(orders.len());
        for order in orders {
            match self.perms.iter().find(|p| p.order == *order) {
                Some(existing) => next.push(*existing),
                None => {
                    let db = env.create_database(wtxn, Some(&order.table_name()))?;
                    let added = IndexPermutation { order: *order, db };
                    self.populate(wtxn, &source, &added)?;
                    info!(index = %order, "populated new index permutation");
                    next.push(added);
                }
            }
        }
        for perm in &self.perms {
            if !orders.contains(&perm.order) {
                perm.db.clear(wtxn)?;
                info!(index = %perm.order, "dropped index permutation");
            }
        }
        self.perms = next;
        Ok(())
    }

    /// Empties every permutation table.
    pub fn clear(&self, wtxn: &mut RwTxn) -> Result<()> {
        for perm in &self.perms {
            perm.db.clear(wtxn)?;
        }
        Ok(())
    }

    fn populate(
        &self,
        wtxn: &mut RwTxn,
        source: &IndexPermutation,
        target: &IndexPermutation,
    ) -> Result<()> {
        let mut resume: Option<Vec<u8>> = None;
        let mut chunk: Vec<([u64; 4], u8)> = Vec::new();
        let mut key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
        loop {
            chunk.clear();
            {
                let lower = match &resume {
                    Some(k) => Bound::Excluded(&k[..]),
                    None => Bound::Unbounded,
                };
                let range = (lower, Bound::Unbounded);
                let mut entries = source.db.range(wtxn, &range)?;
                while let Some(entry) = entries.next() {
                    let (raw, value) = entry?;
                    let flags = value.first().copied().unwrap_or(0);
                    chunk.push((source.order.decode_key(raw)?, flags));
                    if chunk.len() >= MUTATION_CHUNK {
                        break;
                    }
                }
            }
            let Some((last, _)) = chunk.last().copied() else {
                break;
            };
            for (ids, flags) in &chunk {
                key.clear();
                target.order.write_key(&mut key, *ids);
                target.db.put(wtxn, &key, &[*flags])?;
            }
            if chunk.len() < MUTATION_CHUNK {
                break;
            }
            let mut resume_key = Vec::with_capacity(4 * varint::MAX_VARINT_LEN);
            source.order.write_key(&mut resume_key, last);
            resume = Some(resume_key);
        }
        Ok(())
    }

    /// Full contents of one permutation, for consistency checks.
    #[cfg(test)]
    fn contents(&self, txn: &RoTxn, perm: &IndexPermutation) -> Result<Vec<([u64; 4], u8)>> {
        let mut out = Vec::new();
        let mut entries = perm.db.iter(txn)?;
        while let Some(entry) = entries.next() {
            let (raw, value) = entry?;
            out.push((perm.order.decode_key(raw)?, value.first().copied().unwrap_or(0)));
        }
        out.sort_unstable();
        Ok(out)
    }
}

fn validate_orders(orders: &[FieldOrder]) -> Result<()> {
    if orders.is_empty() {
        return Err(StoreError::Invalid(
            "at least one index permutation is required".to_string(),
        ));
    }
    for (i, order) in orders.iter().enumerate() {
        if orders[..i].contains(order) {
            return Err(StoreError::Invalid(format!(
                "duplicate index permutation {order}"
            )));
        }
    }
    Ok(())
}

/// Index (in key order) of the first field where two keys of the same
/// permutation differ.
fn first_divergent_field(a: &[u8], b: &[u8]) -> Result<Option<usize>> {
    let mut ra = VarintReader::new(a);
    let mut rb = VarintReader::new(b);
    for field in 0..4 {
        if ra.next()? != rb.next()? {
            return Ok(Some(field));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heed::{EnvFlags, EnvOpenOptions};

    fn test_env(dir: &std::path::Path) -> Env {
        let mut opts = EnvOpenOptions::new();
        opts.map_size(32 << 20).max_dbs(8);
        unsafe {
            opts.flags(EnvFlags::NO_TLS);
        }
        unsafe { opts.open(dir) }.unwrap()
    }

    fn orders(names: &[&str]) -> Vec<FieldOrder> {
        names.iter().map(|n| FieldOrder::parse(n).unwrap()).collect()
    }

    fn open_store(env: &Env, names: &[&str]) -> IndexStore {
        let mut wtxn = env.write_txn().unwrap();
        let store = IndexStore::open(env, &mut wtxn, &orders(names)).unwrap();
        wtxn.commit().unwrap();
        store
    }

    fn quad(s: u64, p: u64, o: u64, c: u64) -> Quad {
        Quad::from_ids([s, p, o, c])
    }

    #[test]
    fn field_order_parsing() {
        assert_eq!(FieldOrder::parse("spoc").unwrap().to_string(), "spoc");
        assert_eq!(FieldOrder::parse("cosp").unwrap().table_name(), "idx_cosp");
        assert!(FieldOrder::parse("spo").is_err());
        assert!(FieldOrder::parse("sspo").is_err());
        assert!(FieldOrder::parse("spox").is_err());
        assert!(FieldOrder::parse("spocs").is_err());
    }

    #[test]
    fn keys_round_trip_through_any_order() {
        let order = FieldOrder::parse("cosp").unwrap();
        let ids = [3, 70000, 241, 0];
        let mut key = Vec::new();
        order.write_key(&mut key, ids);
        assert_eq!(order.decode_key(&key).unwrap(), ids);
    }

    #[test]
    fn scoring_stops_at_first_unbound_field() {
        let spoc = FieldOrder::parse("spoc").unwrap();
        let posc = FieldOrder::parse("posc").unwrap();
        let pattern = [None, Some(2), Some(3), None];
        assert_eq!(spoc.score(&pattern), 0);
        assert_eq!(posc.score(&pattern), 2);
    }

    #[test]
    fn best_index_prefers_higher_score_and_first_on_ties() {
        let env_dir = tempfile::tempdir().unwrap();
        let env = test_env(env_dir.path());
        let store = open_store(&env, &["spoc", "posc", "cspo"]);

        let by_pred = [None, Some(7), None, None];
        assert_eq!(store.best_index(&by_pred).order.to_string(), "posc");

        // Both spoc and posc score 2 on (s,p); the first registered wins.
        let by_sp = [Some(1), Some(2), None, None];
        assert_eq!(store.best_index(&by_sp).order.to_string(), "spoc");
    }

    #[test]
    fn insert_keeps_permutations_identical() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let store = open_store(&env, &["spoc", "posc", "ospc"]);

        let mut wtxn = env.write_txn().unwrap();
        assert!(store.insert(&mut wtxn, &quad(1, 2, 3, 0), true).unwrap());
        assert!(store.insert(&mut wtxn, &quad(1, 2, 4, 5), true).unwrap());
        assert!(!store.insert(&mut wtxn, &quad(1, 2, 3, 0), true).unwrap());
        wtxn.commit().unwrap();

        let rtxn = env.read_txn().unwrap();
        let reference = store.contents(&rtxn, &store.perms[0]).unwrap();
        assert_eq!(reference.len(), 2);
        for perm in store.permutations() {
            assert_eq!(store.contents(&rtxn, perm).unwrap(), reference);
        }
    }

    #[test]
    fn explicit_insert_upgrades_inferred() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let store = open_store(&env, &["spoc", "posc"]);

        let q = quad(1, 2, 3, 0);
        let mut wtxn = env.write_txn().unwrap();
        assert!(store.insert(&mut wtxn, &q, false).unwrap());
        assert!(!store.insert(&mut wtxn, &q, true).unwrap());
        // Inferred over explicit must not downgrade.
        assert!(!store.insert(&mut wtxn, &q, false).unwrap());
        wtxn.commit().unwrap();

        let rtxn = env.read_txn().unwrap();
        for perm in store.permutations() {
            let contents = store.contents(&rtxn, perm).unwrap();
            assert_eq!(contents, vec![([1, 2, 3, 0], EXPLICIT_FLAG)]);
        }
    }

    #[test]
    fn remove_reports_per_graph_counts() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let store = open_store(&env, &["spoc", "posc"]);

        let mut wtxn = env.write_txn().unwrap();
        store.insert(&mut wtxn, &quad(1, 2, 3, 0), true).unwrap();
        store.insert(&mut wtxn, &quad(1, 2, 4, 9), true).unwrap();
        store.insert(&mut wtxn, &quad(1, 5, 4, 9), true).unwrap();
        store.insert(&mut wtxn, &quad(8, 2, 3, 9), false).unwrap();

        let counts = store
            .remove_pattern(&mut wtxn, &[Some(1), None, None, None], true)
            .unwrap();
        assert_eq!(counts.get(&0), Some(&1));
        assert_eq!(counts.get(&9), Some(&2));
        wtxn.commit().unwrap();

        let rtxn = env.read_txn().unwrap();
        let reference = store.contents(&rtxn, &store.perms[0]).unwrap();
        assert_eq!(reference, vec![([8, 2, 3, 9], 0)]);
        for perm in store.permutations() {
            assert_eq!(store.contents(&rtxn, perm).unwrap(), reference);
        }
    }

    #[test]
    fn remove_respects_the_explicit_flag() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let store = open_store(&env, &["spoc"]);

        let mut wtxn = env.write_txn().unwrap();
        store.insert(&mut wtxn, &quad(1, 2, 3, 0), true).unwrap();
        store.insert(&mut wtxn, &quad(1, 2, 4, 0), false).unwrap();
        let counts = store
            .remove_pattern(&mut wtxn, &[Some(1), None, None, None], false)
            .unwrap();
        assert_eq!(counts.get(&0), Some(&1));
        wtxn.commit().unwrap();

        let rtxn = env.read_txn().unwrap();
        let left = store.contents(&rtxn, &store.perms[0]).unwrap();
        assert_eq!(left, vec![([1, 2, 3, 0], EXPLICIT_FLAG)]);
    }

    #[test]
    fn cardinality_is_exact_for_small_and_bound_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let store = open_store(&env, &["spoc", "posc"]);

        let mut wtxn = env.write_txn().unwrap();
        for o in 0..10 {
            store.insert(&mut wtxn, &quad(1, 2, o, 0), true).unwrap();
        }
        store.insert(&mut wtxn, &quad(3, 2, 1, 0), true).unwrap();
        wtxn.commit().unwrap();

        let rtxn = env.read_txn().unwrap();
        let bound = [Some(1), Some(2), Some(3), Some(0)];
        assert_eq!(store.cardinality(&rtxn, &bound).unwrap(), 1.0);
        let missing = [Some(1), Some(2), Some(99), Some(0)];
        assert_eq!(store.cardinality(&rtxn, &missing).unwrap(), 0.0);
        let wildcard = [None, None, None, None];
        assert_eq!(store.cardinality(&rtxn, &wildcard).unwrap(), 11.0);
        let by_subject = [Some(1), None, None, None];
        assert_eq!(store.cardinality(&rtxn, &by_subject).unwrap(), 10.0);
    }

    #[test]
    fn reconfigure_adds_and_drops_permutations() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let mut store = open_store(&env, &["spoc", "posc"]);

        let mut wtxn = env.write_txn().unwrap();
        for s in 0..50 {
            store.insert(&mut wtxn, &quad(s, 2, 3, s % 3), true).unwrap();
        }
        store
            .reconfigure(&env, &mut wtxn, &orders(&["spoc", "cspo"]))
            .unwrap();
        wtxn.commit().unwrap();

        assert_eq!(
            store.orders().iter().map(|o| o.to_string()).collect::<Vec<_>>(),
            vec!["spoc", "cspo"]
        );
        let rtxn = env.read_txn().unwrap();
        let reference = store.contents(&rtxn, &store.perms[0]).unwrap();
        assert_eq!(reference.len(), 50);
        assert_eq!(store.contents(&rtxn, &store.perms[1]).unwrap(), reference);
    }

    #[test]
    fn invalid_configurations_are_rejected_eagerly() {
        assert!(validate_orders(&[]).is_err());
        assert!(validate_orders(&orders(&["spoc", "spoc"])).is_err());
    }
}
