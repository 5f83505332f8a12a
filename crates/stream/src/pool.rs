// Copyright 2025-2026 CEMAXECUTER LLC

//! Buffer pool for hot-path packet reuse.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::packet::{PacketMut, Recycle};

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Payloads allocated because no idle buffer was available.
    pub created: u64,
    /// Buffers handed out by `acquire` (fresh or reused).
    pub acquired: u64,
    /// Buffers returned to the pool after their last release.
    pub recycled: u64,
    /// Holder handles created (freeze + every clone).
    pub holds: u64,
    /// Holder handles released.
    pub released: u64,
}

impl PoolStats {
    /// Buffers currently out of the pool. Zero at quiescence.
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.recycled)
    }
}

pub(crate) struct PoolShared<T> {
    free: Mutex<Vec<T>>,
    max_idle: usize,
    created: AtomicU64,
    acquired: AtomicU64,
    recycled: AtomicU64,
    holds: AtomicU64,
    released: AtomicU64,
}

impl<T: Recycle> PoolShared<T> {
    pub(crate) fn take(&self) -> T {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        let reused = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match reused {
            Some(payload) => payload,
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                T::default()
            }
        }
    }

    pub(crate) fn recycle(&self, mut payload: T) {
        payload.recycle();
        {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            if free.len() < self.max_idle {
                free.push(payload);
            }
        }
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_hold(&self) {
        self.holds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_release(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

/// Pool of reusable payload buffers.
///
/// Cloning the pool clones a handle to the same free list. Safe to acquire
/// from one thread and release from another; the free list has its own
/// plain mutex and is never held while user code runs.
pub struct BufferPool<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T> Clone for BufferPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Recycle> BufferPool<T> {
    /// Create a pool that keeps at most `max_idle` released buffers around.
    pub fn new(max_idle: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::with_capacity(max_idle)),
                max_idle,
                created: AtomicU64::new(0),
                acquired: AtomicU64::new(0),
                recycled: AtomicU64::new(0),
                holds: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Allocate `count` idle buffers up front, each prepared by `init`.
    pub fn preallocate(&self, count: usize, mut init: impl FnMut(&mut T)) {
        let mut free = self
            .shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let room = self.shared.max_idle.saturating_sub(free.len());
        for _ in 0..count.min(room) {
            let mut payload = T::default();
            init(&mut payload);
            free.push(payload);
            self.shared.created.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take a cleared buffer, reusing an idle one when possible.
    pub fn acquire(&self) -> PacketMut<T> {
        PacketMut::from_pool(&self.shared)
    }

    /// Number of idle buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.shared.created.load(Ordering::Relaxed),
            acquired: self.shared.acquired.load(Ordering::Relaxed),
            recycled: self.shared.recycled.load(Ordering::Relaxed),
            holds: self.shared.holds.load(Ordering::Relaxed),
            released: self.shared.released.load(Ordering::Relaxed),
        }
    }
}
