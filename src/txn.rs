//! Transaction lifecycle: pooled, versioned read handles, the exclusive
//! writer lock, and stop-the-world map growth.
//!
//! Read side: every scan borrows a [`ReadHandle`] from a pool. A handle owns
//! at most one native LMDB read transaction. Whenever that transaction is
//! (re)opened the handle's version counter increments; a scan that captured
//! an older version knows its snapshot rotated and must re-derive its
//! position from the last key it returned before reading on.
//!
//! Write side: a single logical writer at a time, enforced by an exclusive
//! non-reentrant lock owned by this module. Growing the memory map requires
//! that no transaction is live in this process, so the grow path runs under
//! the writer lock with no write transaction open, deactivates every tracked
//! read handle while holding its state lock, resizes, and lets readers
//! reactivate lazily on their next access.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use heed::{Env, RoTxn};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::{Result, StoreError};

/// Idle read handles retained for reuse; further releases destroy the handle.
const READ_POOL_CAP: usize = 16;

/// Free-space margin that triggers proactive map growth.
const GROW_MARGIN: u64 = 1 << 20;

/// LMDB map sizes must be page-aligned.
const PAGE_SIZE: usize = 4096;

/// A native read transaction detached from the environment borrow.
///
/// The environment is opened with `MDB_NOTLS`, so read transactions are not
/// bound to the creating thread and may be parked in a shared pool.
struct StaticRoTxn(RoTxn<'static>);

// MDB_NOTLS read transactions carry no thread-local state; see module docs.
unsafe impl Send for StaticRoTxn {}

#[derive(Default)]
struct HandleState {
    txn: Option<StaticRoTxn>,
}

/// A pooled, versioned read-transaction handle.
///
/// State machine: `Idle` (no native transaction, pooled) ⇄ `Active`. Every
/// activation bumps `version`.
pub struct ReadHandle {
    state: Mutex<HandleState>,
    version: AtomicU64,
}

impl ReadHandle {
    fn new() -> Arc<ReadHandle> {
        Arc::new(ReadHandle {
            state: Mutex::new(HandleState::default()),
            version: AtomicU64::new(0),
        })
    }

    /// Current version; increments whenever the native transaction is
    /// renewed or invalidated.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// Coordinates read-transaction pooling, the exclusive writer lock, and map
/// auto-grow for one LMDB environment.
pub struct TxnManager {
    env: Env,
    pool: Mutex<Vec<Arc<ReadHandle>>>,
    tracked: Mutex<Vec<Weak<ReadHandle>>>,
    write_lock: Mutex<()>,
}

impl TxnManager {
    pub fn new(env: Env) -> Arc<TxnManager> {
        Arc::new(TxnManager {
            env,
            pool: Mutex::new(Vec::new()),
            tracked: Mutex::new(Vec::new()),
            write_lock: Mutex::new(()),
        })
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Takes the exclusive writer lock. Non-reentrant: a thread already
    /// holding the lock must not call this again.
    pub fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    /// Borrows a read handle from the pool, activating it so the first read
    /// does not pay the open cost.
    pub fn acquire(&self) -> Result<Arc<ReadHandle>> {
        let handle = self.pool.lock().pop().unwrap_or_else(ReadHandle::new);
        {
            let mut state = handle.state.lock();
            if state.txn.is_none() {
                state.txn = Some(self.open_read()?);
                handle.version.fetch_add(1, Ordering::Release);
            }
        }
        let mut tracked = self.tracked.lock();
        tracked.retain(|w| w.strong_count() > 0);
        // A pooled handle re-enters here on every borrow; tracking it twice
        // would make grow() lock the same state mutex twice.
        if !tracked.iter().any(|w| w.as_ptr() == Arc::as_ptr(&handle)) {
            tracked.push(Arc::downgrade(&handle));
        }
        Ok(handle)
    }

    /// Returns a handle to the pool. The native transaction is dropped so an
    /// idle handle never pins an old snapshot; the handle itself is reused.
    pub fn release(&self, handle: Arc<ReadHandle>) {
        handle.state.lock().txn = None;
        let mut pool = self.pool.lock();
        if pool.len() < READ_POOL_CAP {
            pool.push(handle);
        }
    }

    /// Runs `f` against the handle's native transaction, reactivating the
    /// handle first if it was deactivated (by auto-grow or pooling). `f`
    /// receives the handle's current version so the caller can detect a
    /// snapshot rotation since its previous access.
    pub fn with_txn<R>(
        &self,
        handle: &ReadHandle,
        f: impl FnOnce(&RoTxn<'_>, u64) -> Result<R>,
    ) -> Result<R> {
        let mut state = handle.state.lock();
        if state.txn.is_none() {
            state.txn = Some(self.open_read()?);
            handle.version.fetch_add(1, Ordering::Release);
        }
        let version = handle.version.load(Ordering::Acquire);
        match state.txn.as_ref() {
            Some(txn) => f(&txn.0, version),
            None => Err(StoreError::Corruption("read handle lost its transaction")),
        }
    }

    /// Proactive auto-grow check. Returns true when the map was grown.
    ///
    /// Must be called with the writer lock held and no write transaction
    /// open.
    pub fn ensure_capacity(&self, expected_write: u64) -> Result<bool> {
        let map_size = self.env.info().map_size as u64;
        let used = self.env.non_free_pages_size()?;
        let free = map_size.saturating_sub(used);
        if free >= expected_write.saturating_mul(2) + GROW_MARGIN {
            return Ok(false);
        }
        self.grow(expected_write)?;
        Ok(true)
    }

    /// Doubles the map until it fits current usage plus `needed` plus the
    /// safety margin. Stop-the-world: all tracked read handles are
    /// deactivated (version bumped) for the duration of the resize.
    pub fn grow(&self, needed: u64) -> Result<()> {
        let map_size = self.env.info().map_size;
        let used = self.env.non_free_pages_size()?;
        let target = used + needed.saturating_mul(2) + GROW_MARGIN;
        let mut new_size = map_size.max(PAGE_SIZE);
        while (new_size as u64) < target {
            new_size = new_size.saturating_mul(2);
        }
        new_size = new_size.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        if new_size <= map_size {
            return Ok(());
        }

        let mut tracked = self.tracked.lock();
        tracked.retain(|w| w.strong_count() > 0);
        let handles: Vec<Arc<ReadHandle>> = tracked.iter().filter_map(Weak::upgrade).collect();
        // Hold every handle's state lock across the resize so no reader can
        // reactivate while the map is moving.
        let mut guards: Vec<MutexGuard<'_, HandleState>> =
            handles.iter().map(|h| h.state.lock()).collect();
        for (handle, guard) in handles.iter().zip(guards.iter_mut()) {
            if guard.txn.take().is_some() {
                handle.version.fetch_add(1, Ordering::Release);
            }
        }
        trace!(readers = handles.len(), "deactivated read handles for resize");

        // Safety: no transaction is live in this process; the writer lock is
        // held by the caller and all read handles are deactivated above.
        unsafe {
            self.env.resize(new_size)?;
        }
        debug!(
            old_size = map_size,
            new_size, "grew backing map"
        );
        Ok(())
    }

    fn open_read(&self) -> Result<StaticRoTxn> {
        Ok(StaticRoTxn(self.env.clone().static_read_txn()?))
    }
}
