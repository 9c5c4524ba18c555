//! The write coordinator: one logical writer at a time across the term
//! table, every index permutation, and the per-graph counts.
//!
//! A [`StoreWriter`] holds the exclusive writer lock and one native write
//! transaction for its whole life, so a logical write commits atomically
//! across all tables or not at all. Every mutation is also recorded in an
//! operation log: when the backing map fills up mid-transaction, the
//! transaction is aborted, the map grown, and the log replayed into a fresh
//! transaction. Serial recovery before the replay makes re-interning assign
//! the same IDs, so IDs already handed to the caller stay valid. Map-full
//! is therefore never surfaced.
//!
//! [`PipelinedWriter`] moves the same writer to a background thread fed by a
//! bounded blocking channel; `commit` blocks until the thread has drained
//! and committed.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use heed::types::Bytes;
use heed::{Database, MdbError, RwTxn};
use parking_lot::MutexGuard;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::codec::varint;
use crate::error::{Result, StoreError};
use crate::index::IndexStore;
use crate::model::{Quad, Term, TermId, DEFAULT_GRAPH_ID};
use crate::term::TermStore;
use crate::txn::TxnManager;

/// Mutations between proactive free-space checks.
const GROW_CHECK_INTERVAL: usize = 64;

/// Free space under which the proactive check grows the map.
const PROACTIVE_MARGIN: u64 = 4 << 20;

/// Initial reactive grow request; doubles on every further recovery.
const INITIAL_GROW_HINT: u64 = 1 << 20;

/// Queued quad batches in flight to a pipelined writer thread.
const PIPELINE_DEPTH: usize = 1024;

/// Everything a writer mutates, shared with the store facade.
#[derive(Clone)]
pub(crate) struct WriterContext {
    pub manager: Arc<TxnManager>,
    pub terms: Arc<TermStore>,
    pub indexes: Arc<IndexStore>,
    pub graphs: Database<Bytes, Bytes>,
}

impl WriterContext {
    pub fn begin(&self) -> Result<StoreWriter<'_>> {
        let guard = self.manager.lock_writer();
        // No transaction is open yet, so growing here is cheap.
        self.manager.ensure_capacity(INITIAL_GROW_HINT)?;
        let txn = self.manager.env().write_txn()?;
        Ok(StoreWriter {
            ctx: self,
            _guard: guard,
            txn: Some(txn),
            log: Vec::new(),
            deltas: FxHashMap::default(),
            ops_since_check: 0,
            grow_hint: INITIAL_GROW_HINT,
        })
    }
}

#[derive(Clone)]
enum WriteOp {
    Add {
        subject: Term,
        predicate: Term,
        object: Term,
        graph: Option<Term>,
        explicit: bool,
    },
    Intern {
        term: Term,
    },
    Remove {
        pattern: [Option<u64>; 4],
        explicit: bool,
    },
    ClearGraphs {
        graphs: Vec<u64>,
    },
    ClearAll,
}

/// The exclusive logical writer. Dropping without `commit` rolls back.
pub struct StoreWriter<'s> {
    ctx: &'s WriterContext,
    _guard: MutexGuard<'s, ()>,
    txn: Option<RwTxn<'s>>,
    log: Vec<WriteOp>,
    deltas: FxHashMap<u64, i64>,
    ops_since_check: usize,
    grow_hint: u64,
}

impl<'s> StoreWriter<'s> {
    /// Interns the terms of a quad and inserts it into every permutation.
    /// Returns whether the quad was new. `graph: None` targets the default
    /// graph.
    pub fn add(
        &mut self,
        subject: &Term,
        predicate: &Term,
        object: &Term,
        graph: Option<&Term>,
        explicit: bool,
    ) -> Result<bool> {
        let op = WriteOp::Add {
            subject: subject.clone(),
            predicate: predicate.clone(),
            object: object.clone(),
            graph: graph.cloned(),
            explicit,
        };
        let was_new = self.apply(&op)? != 0;
        self.log.push(op);
        self.check_capacity()?;
        Ok(was_new)
    }

    /// Resolves a term to its ID, interning it if new. The returned ID is
    /// stable even if the transaction is internally replayed.
    pub fn resolve_or_create(&mut self, term: &Term) -> Result<TermId> {
        let op = WriteOp::Intern { term: term.clone() };
        let raw = self.apply(&op)?;
        self.log.push(op);
        self.check_capacity()?;
        Ok(TermId(raw))
    }

    /// Removes all quads matching `pattern` with the given explicit flag.
    /// Returns the number removed.
    pub fn remove(&mut self, pattern: [Option<u64>; 4], explicit: bool) -> Result<u64> {
        let op = WriteOp::Remove { pattern, explicit };
        let removed = self.apply(&op)?;
        self.log.push(op);
        self.check_capacity()?;
        Ok(removed)
    }

    /// Removes every quad, explicit or inferred, in each named graph.
    pub fn clear_graphs(&mut self, graphs: &[u64]) -> Result<u64> {
        let op = WriteOp::ClearGraphs {
            graphs: graphs.to_vec(),
        };
        let removed = self.apply(&op)?;
        self.log.push(op);
        self.check_capacity()?;
        Ok(removed)
    }

    /// Destroys all quads, terms, and counts. Previously issued IDs become
    /// invalid wholesale; the term table revision is bumped.
    pub fn clear_all(&mut self) -> Result<()> {
        let op = WriteOp::ClearAll;
        self.apply(&op)?;
        self.log.push(op);
        Ok(())
    }

    /// Applies the accumulated per-graph count deltas and commits.
    pub fn commit(mut self) -> Result<()> {
        loop {
            match self.try_commit() {
                Err(err) if is_map_full(&err) => self.recover()?,
                Err(err) => {
                    // The transaction is already gone; cached IDs from it
                    // must not outlive the rollback.
                    self.ctx.terms.reset_caches();
                    return Err(err);
                }
                Ok(()) => return Ok(()),
            }
        }
    }

    /// Discards the transaction. Term caches are reset because interned
    /// terms may have been cached but are now rolled back.
    pub fn rollback(mut self) {
        self.abandon();
    }

    fn apply(&mut self, op: &WriteOp) -> Result<u64> {
        loop {
            match self.try_apply(op) {
                Err(err) if is_map_full(&err) => self.recover()?,
                other => return other,
            }
        }
    }

    fn try_apply(&mut self, op: &WriteOp) -> Result<u64> {
        let txn = self
            .txn
            .as_mut()
            .ok_or(StoreError::Corruption("write transaction already finished"))?;
        match op {
            WriteOp::Add {
                subject,
                predicate,
                object,
                graph,
                explicit,
            } => {
                let s = self.ctx.terms.intern(txn, subject)?;
                let p = self.ctx.terms.intern(txn, predicate)?;
                let o = self.ctx.terms.intern(txn, object)?;
                let g = match graph {
                    Some(term) => self.ctx.terms.intern(txn, term)?,
                    None => DEFAULT_GRAPH_ID,
                };
                let quad = Quad::new(s, p, o, g);
                let was_new = self.ctx.indexes.insert(txn, &quad, *explicit)?;
                if was_new {
                    *self.deltas.entry(g.0).or_insert(0) += 1;
                }
                Ok(u64::from(was_new))
            }
            WriteOp::Intern { term } => Ok(self.ctx.terms.intern(txn, term)?.0),
            WriteOp::Remove { pattern, explicit } => {
                let counts = self.ctx.indexes.remove_pattern(txn, pattern, *explicit)?;
                let mut total = 0;
                for (graph, n) in counts {
                    *self.deltas.entry(graph).or_insert(0) -= n as i64;
                    total += n;
                }
                Ok(total)
            }
            WriteOp::ClearGraphs { graphs } => {
                let mut total = 0;
                for graph in graphs {
                    let pattern = [None, None, None, Some(*graph)];
                    for explicit in [true, false] {
                        let counts =
                            self.ctx.indexes.remove_pattern(txn, &pattern, explicit)?;
                        for (g, n) in counts {
                            *self.deltas.entry(g).or_insert(0) -= n as i64;
                            total += n;
                        }
                    }
                }
                Ok(total)
            }
            WriteOp::ClearAll => {
                self.ctx.terms.clear(txn)?;
                self.ctx.indexes.clear(txn)?;
                self.ctx.graphs.clear(txn)?;
                self.deltas.clear();
                Ok(0)
            }
        }
    }

    fn try_commit(&mut self) -> Result<()> {
        let mut txn = self
            .txn
            .take()
            .ok_or(StoreError::Corruption("write transaction already finished"))?;
        for (&graph, &delta) in &self.deltas {
            if delta != 0 {
                bump_graph_count(&self.ctx.graphs, &mut txn, graph, delta)?;
            }
        }
        txn.commit()?;
        trace!(ops = self.log.len(), "committed write batch");
        Ok(())
    }

    /// Reactive map-full recovery: abort, grow, replay the whole log into a
    /// fresh transaction. Doubling the grow hint on each pass guarantees the
    /// map eventually fits the batch.
    fn recover(&mut self) -> Result<()> {
        warn!(
            ops = self.log.len(),
            "write transaction hit a full map; growing and replaying"
        );
        self.txn = None;
        self.ctx.terms.reset_caches();
        self.ctx.manager.grow(self.grow_hint)?;
        self.grow_hint = self.grow_hint.saturating_mul(2);

        let txn = self.ctx.manager.env().write_txn()?;
        self.ctx.terms.recover_next_serial(&txn)?;
        self.txn = Some(txn);
        self.deltas.clear();
        for i in 0..self.log.len() {
            let op = self.log[i].clone();
            self.try_apply(&op)?;
        }
        Ok(())
    }

    /// Proactive grow: when free space runs low mid-batch, take the replay
    /// path before the engine starts failing puts.
    fn check_capacity(&mut self) -> Result<()> {
        self.ops_since_check += 1;
        if self.ops_since_check < GROW_CHECK_INTERVAL {
            return Ok(());
        }
        self.ops_since_check = 0;
        let env = self.ctx.manager.env();
        let map_size = env.info().map_size as u64;
        let used = env.non_free_pages_size()?;
        if map_size.saturating_sub(used) < PROACTIVE_MARGIN {
            debug!("free map space low; growing proactively");
            self.recover()?;
        }
        Ok(())
    }

    fn abandon(&mut self) {
        if self.txn.take().is_some() {
            self.ctx.terms.reset_caches();
        }
    }
}

impl Drop for StoreWriter<'_> {
    fn drop(&mut self) {
        self.abandon();
    }
}

fn is_map_full(err: &StoreError) -> bool {
    matches!(err, StoreError::Engine(heed::Error::Mdb(MdbError::MapFull)))
}

/// Current quad count of one graph in the counts table.
pub(crate) fn graph_count(
    db: &Database<Bytes, Bytes>,
    txn: &heed::RoTxn,
    graph: u64,
) -> Result<u64> {
    let mut key = Vec::with_capacity(varint::MAX_VARINT_LEN);
    varint::write(&mut key, graph);
    match db.get(txn, &key)? {
        Some(raw) => {
            let bytes: [u8; 8] = raw
                .try_into()
                .map_err(|_| StoreError::Corruption("malformed graph count"))?;
            Ok(u64::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

fn bump_graph_count(
    db: &Database<Bytes, Bytes>,
    txn: &mut RwTxn,
    graph: u64,
    delta: i64,
) -> Result<()> {
    let current = graph_count(db, txn, graph)?;
    let next = current.saturating_add_signed(delta);
    let mut key = Vec::with_capacity(varint::MAX_VARINT_LEN);
    varint::write(&mut key, graph);
    if next == 0 {
        db.delete(txn, &key)?;
    } else {
        db.put(txn, &key, &next.to_be_bytes())?;
    }
    Ok(())
}

enum PipeOp {
    Add {
        subject: Term,
        predicate: Term,
        object: Term,
        graph: Option<Term>,
        explicit: bool,
    },
}

/// A writer running on a background thread behind a bounded channel.
///
/// `add` blocks when the channel is full; `commit` closes the channel and
/// blocks until the thread has applied everything and committed.
pub struct PipelinedWriter {
    sender: Option<SyncSender<PipeOp>>,
    thread: Option<JoinHandle<Result<u64>>>,
}

impl PipelinedWriter {
    pub(crate) fn spawn(ctx: WriterContext) -> Result<PipelinedWriter> {
        let (sender, receiver): (SyncSender<PipeOp>, Receiver<PipeOp>) =
            sync_channel(PIPELINE_DEPTH);
        let thread = std::thread::Builder::new()
            .name("tetrad-writer".to_string())
            .spawn(move || -> Result<u64> {
                let mut writer = ctx.begin()?;
                let mut added = 0u64;
                for op in receiver {
                    match op {
                        PipeOp::Add {
                            subject,
                            predicate,
                            object,
                            graph,
                            explicit,
                        } => {
                            if writer.add(&subject, &predicate, &object, graph.as_ref(), explicit)?
                            {
                                added += 1;
                            }
                        }
                    }
                }
                writer.commit()?;
                Ok(added)
            })?;
        Ok(PipelinedWriter {
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    pub fn add(
        &self,
        subject: Term,
        predicate: Term,
        object: Term,
        graph: Option<Term>,
        explicit: bool,
    ) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(StoreError::PipelineClosed)?;
        sender
            .send(PipeOp::Add {
                subject,
                predicate,
                object,
                graph,
                explicit,
            })
            .map_err(|_| StoreError::PipelineClosed)
    }

    /// Drains the channel, commits on the writer thread, and returns the
    /// number of quads that were new.
    pub fn commit(mut self) -> Result<u64> {
        drop(self.sender.take());
        let thread = self.thread.take().ok_or(StoreError::PipelineClosed)?;
        thread.join().map_err(|_| StoreError::PipelineClosed)?
    }
}

impl Drop for PipelinedWriter {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
