//! The store facade: opening a store directory, the consumer-facing scan
//! API, term resolution, and aggregate counts.
//!
//! A store directory holds one LMDB environment (`terms`, `graphs`, and one
//! `idx_*` database per permutation) plus `tetrad.toml`, which records the
//! on-disk format version and the active index set. An incompatible version
//! refuses to open; a changed index set triggers a live reindex at open.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use heed::{EnvFlags, EnvOpenOptions, RoTxn};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::index::iter::RecordIterator;
use crate::index::{FieldOrder, IndexStore};
use crate::model::{Quad, QuadPattern, Term, TermId};
use crate::pool::BufferPool;
use crate::term::TermStore;
use crate::txn::TxnManager;
use crate::writer::{self, PipelinedWriter, StoreWriter, WriterContext};

/// On-disk format version. Bumped on any incompatible layout change; opens
/// refuse on mismatch rather than upgrade silently.
pub const FORMAT_VERSION: u32 = 1;

const METADATA_FILE: &str = "tetrad.toml";

/// Named databases: up to 24 permutations plus terms and graphs.
const MAX_DBS: u32 = 32;

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    format_version: u32,
    indexes: Vec<String>,
}

/// Configuration for opening a [`QuadStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    path: PathBuf,
    map_size: usize,
    indexes: Vec<String>,
}

impl StoreOptions {
    pub fn new(path: impl Into<PathBuf>) -> StoreOptions {
        StoreOptions {
            path: path.into(),
            map_size: 1 << 30,
            indexes: vec!["spoc".to_string(), "posc".to_string()],
        }
    }

    /// Initial size of the memory map. Grows automatically; this only sets
    /// the starting point.
    pub fn map_size(mut self, bytes: usize) -> StoreOptions {
        self.map_size = bytes;
        self
    }

    /// The index permutations to maintain, e.g. `["spoc", "posc", "cspo"]`.
    pub fn indexes<I, S>(mut self, orders: I) -> StoreOptions
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes = orders.into_iter().map(Into::into).collect();
        self
    }
}

/// A persistent, transactional quad store.
///
/// One exclusive logical writer at a time (see [`QuadStore::begin_write`]);
/// any number of concurrent readers, each scan on its own pooled snapshot.
pub struct QuadStore {
    ctx: WriterContext,
    pool: Arc<BufferPool>,
    path: PathBuf,
}

impl QuadStore {
    pub fn open(options: StoreOptions) -> Result<QuadStore> {
        fs::create_dir_all(&options.path)?;
        let desired: Vec<FieldOrder> = options
            .indexes
            .iter()
            .map(|s| FieldOrder::parse(s))
            .collect::<Result<_>>()?;
        let meta_path = options.path.join(METADATA_FILE);
        let recorded = read_metadata(&meta_path)?;

        let mut env_opts = EnvOpenOptions::new();
        env_opts.map_size(options.map_size).max_dbs(MAX_DBS);
        // NO_TLS detaches read transactions from threads, which the pooled
        // read-handle design depends on.
        unsafe {
            env_opts.flags(EnvFlags::NO_TLS);
        }
        let env = unsafe { env_opts.open(&options.path) }?;

        let mut wtxn = env.write_txn()?;
        let terms = TermStore::open(&env, &mut wtxn)?;
        let graphs = env.create_database(&mut wtxn, Some("graphs"))?;
        let initial = recorded.as_deref().unwrap_or(&desired);
        let mut indexes = IndexStore::open(&env, &mut wtxn, initial)?;
        let reindex = recorded
            .as_deref()
            .map_or(false, |r| r != desired.as_slice());
        if reindex {
            info!(from = ?initial.iter().map(ToString::to_string).collect::<Vec<_>>(),
                  to = ?options.indexes, "index set changed; reindexing");
            indexes.reconfigure(&env, &mut wtxn, &desired)?;
        }
        wtxn.commit()?;

        if recorded.is_none() || reindex {
            write_metadata(&meta_path, &indexes.orders())?;
        }

        info!(path = %options.path.display(), "opened quad store");
        Ok(QuadStore {
            ctx: WriterContext {
                manager: TxnManager::new(env),
                terms: Arc::new(terms),
                indexes: Arc::new(indexes),
                graphs,
            },
            pool: BufferPool::new(),
            path: options.path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Active index permutation names, in registration order.
    pub fn indexes(&self) -> Vec<String> {
        self.ctx
            .indexes
            .orders()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Begins an exclusive logical write. Blocks while another writer is
    /// active; readers are unaffected.
    pub fn begin_write(&self) -> Result<StoreWriter<'_>> {
        self.ctx.begin()
    }

    /// Spawns a background writer thread fed by a bounded channel.
    pub fn begin_pipelined(&self) -> Result<PipelinedWriter> {
        PipelinedWriter::spawn(self.ctx.clone())
    }

    /// Lazy single-pass scan of all quads matching `pattern`, optionally
    /// restricted to `graphs` (one sub-scan per constraint, in order) and by
    /// explicit flag. A pattern or constraint naming an unknown term
    /// contributes nothing.
    pub fn scan(
        &self,
        pattern: &QuadPattern,
        graphs: &[TermId],
        explicit: Option<bool>,
    ) -> ScanIterator {
        let base = pattern.fields();
        let mut pending = VecDeque::new();
        if graphs.is_empty() {
            pending.push_back(base);
        } else {
            for graph in graphs {
                let mut constrained = base;
                constrained[3] = Some(graph.0);
                pending.push_back(constrained);
            }
        }
        ScanIterator {
            manager: Arc::clone(&self.ctx.manager),
            pool: Arc::clone(&self.pool),
            indexes: Arc::clone(&self.ctx.indexes),
            explicit,
            pending,
            current: None,
            done: false,
        }
    }

    /// Resolves a term to its ID, or [`crate::UNKNOWN_ID`] if not interned.
    pub fn id_of(&self, term: &Term) -> Result<TermId> {
        self.with_read(|txn| self.ctx.terms.id_of(txn, term))
    }

    /// Resolves an ID back to its term.
    pub fn term_of(&self, id: TermId) -> Result<Option<Term>> {
        self.with_read(|txn| self.ctx.terms.term_of(txn, id))
    }

    /// Planner cardinality estimate; exact only for fully-bound and
    /// fully-wildcard patterns.
    pub fn cardinality(&self, pattern: &QuadPattern) -> Result<f64> {
        if pattern.has_unknown() {
            return Ok(0.0);
        }
        self.with_read(|txn| self.ctx.indexes.cardinality(txn, &pattern.fields()))
    }

    /// Total number of stored quads.
    pub fn len(&self) -> Result<u64> {
        self.with_read(|txn| self.ctx.indexes.permutations()[0].len(txn))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of quads in one graph, maintained incrementally at commit.
    pub fn graph_count(&self, graph: TermId) -> Result<u64> {
        self.with_read(|txn| writer::graph_count(&self.ctx.graphs, txn, graph.0))
    }

    /// Current term-table revision; bumped by [`StoreWriter::clear_all`].
    /// IDs captured under an older revision must be re-resolved.
    pub fn revision(&self) -> u64 {
        self.ctx.terms.revision()
    }

    /// Destroys all quads and terms in one transaction.
    pub fn clear(&self) -> Result<()> {
        let mut writer = self.begin_write()?;
        writer.clear_all()?;
        writer.commit()
    }

    fn with_read<R>(&self, f: impl FnOnce(&RoTxn) -> Result<R>) -> Result<R> {
        let handle = self.ctx.manager.acquire()?;
        let out = self.ctx.manager.with_txn(&handle, |txn, _| f(txn));
        self.ctx.manager.release(handle);
        out
    }
}

/// A lazy, single-pass, non-restartable sequence of matching quads in
/// S,P,O,C order. Graph-constrained scans run one segment per constraint.
pub struct ScanIterator {
    manager: Arc<TxnManager>,
    pool: Arc<BufferPool>,
    indexes: Arc<IndexStore>,
    explicit: Option<bool>,
    pending: VecDeque<[Option<u64>; 4]>,
    current: Option<RecordIterator>,
    done: bool,
}

impl ScanIterator {
    /// Stops the scan; further `next` calls return `None`.
    pub fn close(&mut self) {
        if let Some(iter) = &mut self.current {
            iter.close();
        }
        self.current = None;
        self.pending.clear();
        self.done = true;
    }
}

impl Iterator for ScanIterator {
    type Item = Result<Quad>;

    fn next(&mut self) -> Option<Result<Quad>> {
        loop {
            if self.done {
                return None;
            }
            if let Some(iter) = &mut self.current {
                match iter.next_quad() {
                    Ok(Some(quad)) => return Some(Ok(quad)),
                    Ok(None) => self.current = None,
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
            }
            match self.pending.pop_front() {
                Some(segment) => {
                    let perm = self.indexes.best_index(&segment);
                    match RecordIterator::new(
                        Arc::clone(&self.manager),
                        Arc::clone(&self.pool),
                        perm,
                        &segment,
                        self.explicit,
                    ) {
                        Ok(iter) => self.current = Some(iter),
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    }
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

fn read_metadata(path: &Path) -> Result<Option<Vec<FieldOrder>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let meta: Metadata = toml::from_str(&raw)
        .map_err(|err| StoreError::Metadata(format!("{}: {err}", path.display())))?;
    if meta.format_version != FORMAT_VERSION {
        return Err(StoreError::FormatVersion {
            found: meta.format_version,
            supported: FORMAT_VERSION,
        });
    }
    let orders = meta
        .indexes
        .iter()
        .map(|s| FieldOrder::parse(s))
        .collect::<Result<_>>()?;
    Ok(Some(orders))
}

fn write_metadata(path: &Path, orders: &[FieldOrder]) -> Result<()> {
    let meta = Metadata {
        format_version: FORMAT_VERSION,
        indexes: orders.iter().map(ToString::to_string).collect(),
    };
    let raw = toml::to_string_pretty(&meta)
        .map_err(|err| StoreError::Metadata(format!("{}: {err}", path.display())))?;
    fs::write(path, raw)?;
    Ok(())
}
