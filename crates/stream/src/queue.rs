// Copyright 2025-2026 CEMAXECUTER LLC

//! Bounded, closable queue between pipeline stages.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam::channel::{self, select, Receiver, SendTimeoutError, Sender, TrySendError};
use thiserror::Error;

/// How long a blocked `push` parks before re-checking for close.
const PARK_INTERVAL: Duration = Duration::from_millis(5);

/// Push failure. The rejected item is handed back.
#[derive(Error, PartialEq, Eq, Clone, Copy)]
pub enum PushError<T> {
    #[error("queue is full")]
    Full(T),
    #[error("queue is closed")]
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PushError::Closed(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum PopError {
    #[error("timed out waiting for an item")]
    Timeout,
    #[error("queue is closed and drained")]
    Closed,
}

/// Fixed-capacity FIFO shared between threads (usually behind an `Arc`).
///
/// `push` parks while the queue is full, `pop` blocks until an item arrives or
/// the queue is closed and drained. `is_full`/`is_empty` are snapshots and
/// may be stale by the time the caller acts on them.
///
/// The queue never discards an item on its own: items pushed before `close`
/// stay poppable, and whatever is left when the queue is dropped is dropped
/// with it (for packets, that is a normal release).
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    closed: AtomicBool,
    // Dropping the sender disconnects `close_rx`, which wakes every blocked pop.
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
}

impl<T> BoundedQueue<T> {
    /// Capacity is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = channel::bounded(capacity);
        let (close_tx, close_rx) = channel::bounded(0);
        Self {
            tx,
            rx,
            capacity,
            closed: AtomicBool::new(false),
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
        }
    }

    /// Insert an item, parking while the queue is full.
    ///
    /// Fails only once the queue has been closed.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut item = item;
        loop {
            if self.is_closed() {
                return Err(PushError::Closed(item));
            }
            match self.tx.send_timeout(item, PARK_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(back)) => return Err(PushError::Closed(back)),
            }
        }
    }

    /// Insert without blocking.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        if self.is_closed() {
            return Err(PushError::Closed(item));
        }
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) => PushError::Full(item),
            TrySendError::Disconnected(item) => PushError::Closed(item),
        })
    }

    /// Remove the oldest item, blocking until one is available.
    ///
    /// Returns `None` once the queue is closed and everything pushed before
    /// the close has been popped.
    pub fn pop(&self) -> Option<T> {
        if let Ok(item) = self.rx.try_recv() {
            return Some(item);
        }
        select! {
            recv(self.rx) -> item => item.ok(),
            recv(self.close_rx) -> _ => self.rx.try_recv().ok(),
        }
    }

    /// Like `pop`, giving up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        if let Ok(item) = self.rx.try_recv() {
            return Ok(item);
        }
        select! {
            recv(self.rx) -> item => item.map_err(|_| PopError::Closed),
            recv(self.close_rx) -> _ => self.rx.try_recv().map_err(|_| PopError::Closed),
            default(timeout) => Err(PopError::Timeout),
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Reject further pushes and wake blocked consumers. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drop every queued item, returning how many there were.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn is_full(&self) -> bool {
        self.rx.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_fifo_order() {
        let q = BoundedQueue::new(8);
        for i in 0..8 {
            q.push(i).unwrap();
        }
        assert!(q.is_full());
        let out: Vec<i32> = (0..8).map(|_| q.pop().unwrap()).collect();
        assert_eq!(out, (0..8).collect::<Vec<_>>());
        assert!(q.is_empty());
    }

    #[test]
    fn test_try_push_full() {
        let q = BoundedQueue::new(2);
        q.try_push(1).unwrap();
        q.try_push(2).unwrap();
        match q.try_push(3) {
            Err(PushError::Full(3)) => {}
            other => panic!("expected Full(3), got {:?}", other),
        }
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let q = BoundedQueue::new(0);
        assert_eq!(q.capacity(), 1);
        q.try_push(()).unwrap();
        assert!(q.is_full());
    }

    #[test]
    fn test_push_parks_until_space() {
        let q = Arc::new(BoundedQueue::new(1));
        q.push(1).unwrap();

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(2))
        };

        thread::sleep(Duration::from_millis(30));
        assert_eq!(q.len(), 1, "producer must be parked while full");
        assert_eq!(q.pop(), Some(1));
        producer.join().unwrap().unwrap();
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn test_close_wakes_blocked_pop() {
        let q: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop())
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_close_drains_before_none() {
        let q = BoundedQueue::new(4);
        q.push("a").unwrap();
        q.push("b").unwrap();
        q.close();

        assert!(q.push("c").unwrap_err().is_closed());
        assert!(q.try_push("c").unwrap_err().is_closed());
        assert_eq!(q.pop(), Some("a"));
        assert_eq!(q.pop_timeout(Duration::from_millis(10)), Ok("b"));
        assert_eq!(q.pop(), None);
        assert_eq!(q.pop_timeout(Duration::from_millis(10)), Err(PopError::Closed));
    }

    #[test]
    fn test_close_releases_parked_producer() {
        let q = Arc::new(BoundedQueue::new(1));
        q.push(0u8).unwrap();
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(1))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        let err = producer.join().unwrap().unwrap_err();
        assert_eq!(err.into_inner(), 1);
    }

    #[test]
    fn test_pop_timeout() {
        let q: BoundedQueue<u8> = BoundedQueue::new(1);
        let start = Instant::now();
        assert_eq!(q.pop_timeout(Duration::from_millis(25)), Err(PopError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_clear() {
        let q = BoundedQueue::new(4);
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
    }
}
