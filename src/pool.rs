//! Reusable byte-buffer pool and per-scan scratch state.
//!
//! Scans are hot enough that allocating key buffers and record batches per
//! call shows up in profiles. Instead of hiding reuse behind thread-locals,
//! scratch buffers are checked out of an explicit shared pool and travel
//! with the scan that uses them; closing the scan returns them.

use parking_lot::Mutex;
use std::sync::Arc;

/// Upper bound on buffers retained by the pool; excess buffers are dropped.
const MAX_POOLED: usize = 64;

/// Buffers larger than this are not returned to the pool.
const MAX_RETAINED_CAPACITY: usize = 1 << 20;

/// A shared pool of byte buffers.
#[derive(Debug, Default)]
pub struct BufferPool {
    bufs: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Arc<BufferPool> {
        Arc::new(BufferPool::default())
    }

    /// Checks out an empty buffer, reusing a pooled allocation when one is
    /// available.
    pub fn take(&self) -> Vec<u8> {
        self.bufs.lock().pop().unwrap_or_default()
    }

    /// Returns a buffer to the pool. Oversized buffers are dropped so a
    /// single large scan cannot pin memory indefinitely.
    pub fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        let mut bufs = self.bufs.lock();
        if bufs.len() < MAX_POOLED {
            bufs.push(buf);
        }
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.bufs.lock().len()
    }
}

/// Scratch buffers owned by one scan: the range bounds and the flat record
/// batch. Checked out at scan construction and returned on close.
#[derive(Debug)]
pub struct ScanScratch {
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub batch: Vec<u8>,
}

impl ScanScratch {
    pub fn take_from(pool: &BufferPool) -> ScanScratch {
        ScanScratch {
            min_key: pool.take(),
            max_key: pool.take(),
            batch: pool.take(),
        }
    }

    pub fn release_to(self, pool: &BufferPool) {
        pool.put(self.min_key);
        pool.put(self.max_key);
        pool.put(self.batch);
    }
}
