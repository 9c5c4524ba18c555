//! Lazy pattern scans over one index permutation.
//!
//! A scan never holds a native cursor across calls. Instead it refills a
//! pooled batch of packed records per engine visit, remembering the raw key
//! it last saw; the next refill opens a fresh range strictly past that key.
//! Re-deriving the position every time makes snapshot rotation (pooled
//! handle renewal, map auto-grow) a non-event: whatever happened to the
//! handle since the last refill, the scan resumes at the right key.
//!
//! Strategies, chosen at construction:
//! - `Empty`: the pattern names an unknown term, nothing can match.
//! - `Scan`: ranged walk with per-key matching of non-contiguous bound
//!   fields, refilled in small batches.
//! - `Batched`: the pattern binds exactly the two leading key fields, so
//!   every key in the range matches and large blocks can be pulled per
//!   engine visit.

use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use heed::types::Bytes;
use heed::Database;
use tracing::trace;

use super::{FieldOrder, IndexPermutation, EXPLICIT_FLAG};
use crate::codec::{group, KeyMatcher};
use crate::error::Result;
use crate::model::{Quad, UNKNOWN_ID};
use crate::pool::{BufferPool, ScanScratch};
use crate::txn::{ReadHandle, TxnManager};

/// Records pulled per engine visit on the ranged strategy.
const SCAN_BATCH: usize = 64;

/// Records pulled per engine visit when the whole range matches.
const DUP_BATCH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Empty,
    Scan,
    Batched,
}

/// Cross-thread close signal for a [`RecordIterator`].
///
/// Closing only raises a flag; the owning side releases the handle and
/// scratch buffers when it next touches the iterator (or drops it).
#[derive(Clone)]
pub struct IterCloser {
    closed: Arc<AtomicBool>,
}

impl IterCloser {
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// A single-pass, non-restartable scan yielding quads in key order of the
/// chosen permutation.
pub struct RecordIterator {
    manager: Arc<TxnManager>,
    pool: Arc<BufferPool>,
    handle: Option<Arc<ReadHandle>>,
    db: Database<Bytes, Bytes>,
    order: FieldOrder,
    matcher: KeyMatcher,
    explicit: Option<bool>,
    strategy: Strategy,
    scratch: Option<ScanScratch>,
    last_key: Vec<u8>,
    started: bool,
    batch_pos: usize,
    closed: Arc<AtomicBool>,
    exhausted: bool,
}

impl RecordIterator {
    /// Plans and opens a scan of `perm` for `pattern` (s,p,o,c order),
    /// optionally filtered by explicit flag.
    pub fn new(
        manager: Arc<TxnManager>,
        pool: Arc<BufferPool>,
        perm: &IndexPermutation,
        pattern: &[Option<u64>; 4],
        explicit: Option<bool>,
    ) -> Result<RecordIterator> {
        let order = perm.order();
        let strategy = plan(&order, pattern);
        let closed = Arc::new(AtomicBool::new(false));
        if strategy == Strategy::Empty {
            return Ok(RecordIterator {
                manager,
                pool,
                handle: None,
                db: perm.db(),
                order,
                matcher: KeyMatcher::new([None; 4]),
                explicit,
                strategy,
                scratch: None,
                last_key: Vec::new(),
                started: false,
                batch_pos: 0,
                closed,
                exhausted: true,
            });
        }
        let mut scratch = ScanScratch::take_from(&pool);
        order.write_min_key(&mut scratch.min_key, pattern);
        order.write_max_key(&mut scratch.max_key, pattern);
        let handle = manager.acquire()?;
        trace!(index = %order, ?strategy, "opened scan");
        Ok(RecordIterator {
            manager,
            pool,
            handle: Some(handle),
            db: perm.db(),
            order,
            matcher: order.matcher(pattern),
            explicit,
            strategy,
            scratch: Some(scratch),
            last_key: Vec::new(),
            started: false,
            batch_pos: 0,
            closed,
            exhausted: false,
        })
    }

    /// Handle for closing this scan from another thread.
    pub fn closer(&self) -> IterCloser {
        IterCloser {
            closed: Arc::clone(&self.closed),
        }
    }

    /// Next matching quad, or `None` once the range is exhausted or the
    /// scan was closed. After `None` every further call returns `None`.
    pub fn next_quad(&mut self) -> Result<Option<Quad>> {
        loop {
            if self.exhausted || self.closed.load(Ordering::Acquire) {
                self.release();
                return Ok(None);
            }
            if let Some(scratch) = &self.scratch {
                if self.batch_pos < scratch.batch.len() {
                    let (record, used) = group::read5(&scratch.batch[self.batch_pos..])?;
                    self.batch_pos += used;
                    let [s, p, o, c, _flags] = record;
                    return Ok(Some(Quad::from_ids([s, p, o, c])));
                }
            }
            self.refill()?;
            if self
                .scratch
                .as_ref()
                .map_or(true, |scratch| scratch.batch.is_empty())
            {
                self.exhausted = true;
            }
        }
    }

    /// Idempotent; also invoked by drop.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.release();
    }

    fn refill(&mut self) -> Result<()> {
        let Some(handle) = self.handle.as_ref() else {
            return Ok(());
        };
        let Some(scratch) = self.scratch.as_mut() else {
            return Ok(());
        };
        scratch.batch.clear();
        self.batch_pos = 0;

        let db = self.db;
        let order = self.order;
        let matcher = &self.matcher;
        let explicit = self.explicit;
        let started = self.started;
        let limit = match self.strategy {
            Strategy::Batched => DUP_BATCH,
            _ => SCAN_BATCH,
        };
        let ScanScratch {
            min_key,
            max_key,
            batch,
        } = scratch;
        let last_key = &mut self.last_key;

        self.manager.with_txn(handle, |txn, _version| {
            let lower = if started {
                Bound::Excluded(&last_key[..])
            } else {
                Bound::Included(&min_key[..])
            };
            let range = (lower, Bound::Included(&max_key[..]));
            let mut entries = db.range(txn, &range)?;
            let mut emitted = 0usize;
            while let Some(entry) = entries.next() {
                let (key, value) = entry?;
                last_key.clear();
                last_key.extend_from_slice(key);
                if !matcher.matches(key) {
                    continue;
                }
                let flags = value.first().copied().unwrap_or(0);
                if let Some(want) = explicit {
                    if (flags & EXPLICIT_FLAG != 0) != want {
                        continue;
                    }
                }
                let [s, p, o, c] = order.decode_key(key)?;
                group::write5(batch, [s, p, o, c, u64::from(flags)]);
                emitted += 1;
                if emitted >= limit {
                    break;
                }
            }
            Ok(())
        })?;
        self.started = true;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.manager.release(handle);
        }
        if let Some(scratch) = self.scratch.take() {
            scratch.release_to(&self.pool);
        }
    }
}

impl Drop for RecordIterator {
    fn drop(&mut self) {
        self.release();
    }
}

fn plan(order: &FieldOrder, pattern: &[Option<u64>; 4]) -> Strategy {
    if pattern.contains(&Some(UNKNOWN_ID.0)) {
        return Strategy::Empty;
    }
    let bound = pattern.iter().filter(|f| f.is_some()).count();
    if bound == 2 && order.score(pattern) == 2 {
        Strategy::Batched
    } else {
        Strategy::Scan
    }
}
