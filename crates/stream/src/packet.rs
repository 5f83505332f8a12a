// Copyright 2025-2026 CEMAXECUTER LLC

//! Reference-counted packets.
//!
//! A [`Packet`] is an immutable, shared handle to a payload. Every handle is
//! one holder: cloning a handle adds a holder, dropping it releases one. When
//! the last holder releases, the payload goes back to the pool it was drawn
//! from (or is freed when it has no pool). Because the count lives in the
//! handles themselves, a packet cannot be released twice or read after its
//! final release.
//!
//! Payloads are only mutable while uniquely owned: through a [`PacketMut`]
//! before the first handoff, or through [`Packet::make_mut`], which copies the
//! payload into a fresh buffer whenever anyone else still holds it.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::pool::PoolShared;

/// A payload that can be cleared and reused by a [`BufferPool`](crate::BufferPool).
pub trait Recycle: Default {
    /// Reset the payload for reuse. Implementations should keep allocated
    /// capacity so the next frame does not reallocate.
    fn recycle(&mut self);
}

struct Inner<T: Recycle> {
    payload: T,
    home: Option<Arc<PoolShared<T>>>,
}

impl<T: Recycle> Drop for Inner<T> {
    // Runs exactly once, when the last holder lets go.
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            home.recycle(std::mem::take(&mut self.payload));
        }
    }
}

/// Shared, immutable handle to a payload.
pub struct Packet<T: Recycle> {
    inner: Arc<Inner<T>>,
}

impl<T: Recycle> Packet<T> {
    /// Wrap a value that does not belong to any pool.
    pub fn new(payload: T) -> Self {
        PacketMut::new(payload).freeze()
    }

    /// Number of live holders of this payload.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// True if both handles refer to the same payload.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// True if the payload came from a pool.
    pub fn is_pooled(&self) -> bool {
        self.inner.home.is_some()
    }

    /// Release this holder. Same as dropping the handle.
    pub fn release(self) {}

    /// Mutable access to the payload, copying it first if it is shared.
    ///
    /// The copy is drawn from the same pool as the original and this handle
    /// moves over to it, so other holders never observe the mutation.
    pub fn make_mut(&mut self) -> &mut T
    where
        T: Clone,
    {
        if Arc::get_mut(&mut self.inner).is_none() {
            let mut copy = match &self.inner.home {
                Some(home) => PacketMut::from_pool(home),
                None => PacketMut::new(T::default()),
            };
            copy.clone_from(&self.inner.payload);
            *self = copy.freeze();
        }
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => &mut inner.payload,
            None => unreachable!("a freshly copied packet has exactly one holder"),
        }
    }
}

impl<T: Recycle> Clone for Packet<T> {
    fn clone(&self) -> Self {
        if let Some(home) = &self.inner.home {
            home.note_hold();
        }
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Recycle> Drop for Packet<T> {
    fn drop(&mut self) {
        if let Some(home) = &self.inner.home {
            home.note_release();
        }
    }
}

impl<T: Recycle> Deref for Packet<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.payload
    }
}

impl<T: Recycle> From<T> for Packet<T> {
    fn from(payload: T) -> Self {
        Packet::new(payload)
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("refs", &self.ref_count())
            .field("payload", &self.inner.payload)
            .finish()
    }
}

/// Uniquely owned payload that has not been handed off yet.
///
/// Dropping a `PacketMut` without freezing it returns the buffer to its pool.
pub struct PacketMut<T: Recycle> {
    payload: T,
    home: Option<Arc<PoolShared<T>>>,
}

impl<T: Recycle> PacketMut<T> {
    /// Unpooled payload.
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            home: None,
        }
    }

    pub(crate) fn from_pool(home: &Arc<PoolShared<T>>) -> Self {
        Self {
            payload: home.take(),
            home: Some(Arc::clone(home)),
        }
    }

    /// Seal the payload into a shareable packet with a single holder.
    pub fn freeze(mut self) -> Packet<T> {
        let home = self.home.take();
        if let Some(home) = &home {
            home.note_hold();
        }
        Packet {
            inner: Arc::new(Inner {
                payload: std::mem::take(&mut self.payload),
                home,
            }),
        }
    }
}

impl<T: Recycle> Drop for PacketMut<T> {
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            home.recycle(std::mem::take(&mut self.payload));
        }
    }
}

impl<T: Recycle> Deref for PacketMut<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.payload
    }
}

impl<T: Recycle> DerefMut for PacketMut<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.payload
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for PacketMut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PacketMut").field(&self.payload).finish()
    }
}
