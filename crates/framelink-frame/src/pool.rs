//! Buffer pooling capability.
//!
//! The framing and stream layers only ever call [`BufferPool::acquire`] and
//! [`BufferPool::release`]; how buffers are allocated and recycled is up to
//! the implementation. Once a component has released a buffer it no longer
//! owns it, which the move into `release` enforces.

use std::sync::{Mutex, PoisonError};

use crate::buffer::Buffer;

/// Source and sink of reusable [`Buffer`]s.
pub trait BufferPool: Send + Sync {
    /// Hand out an empty buffer.
    fn acquire(&self) -> Buffer;

    /// Take a buffer back. The caller must not keep any reference to it.
    fn release(&self, buffer: Buffer);
}

/// Allocates on every acquire and drops on release.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapPool;

impl BufferPool for HeapPool {
    fn acquire(&self) -> Buffer {
        Buffer::new()
    }

    fn release(&self, _buffer: Buffer) {}
}

/// Default number of idle buffers a [`FreeListPool`] keeps.
pub const DEFAULT_MAX_IDLE: usize = 64;

/// Default largest capacity a [`FreeListPool`] keeps: 1 MiB.
pub const DEFAULT_MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// Bounded free list of previously released buffers.
///
/// Buffers that grew beyond `max_retained_capacity` are dropped on release
/// rather than pinning a large allocation in the pool.
#[derive(Debug)]
pub struct FreeListPool {
    free: Mutex<Vec<Buffer>>,
    max_idle: usize,
    max_retained_capacity: usize,
    initial_capacity: usize,
}

impl FreeListPool {
    /// Create a pool keeping at most `max_idle` buffers of at most
    /// `max_retained_capacity` bytes each.
    pub fn new(max_idle: usize, max_retained_capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            max_retained_capacity,
            initial_capacity: 0,
        }
    }

    /// Capacity given to freshly allocated buffers.
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity.min(self.max_retained_capacity);
        self
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for FreeListPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE, DEFAULT_MAX_RETAINED_CAPACITY)
    }
}

impl BufferPool for FreeListPool {
    fn acquire(&self) -> Buffer {
        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        recycled.unwrap_or_else(|| Buffer::with_capacity(self.initial_capacity))
    }

    fn release(&self, mut buffer: Buffer) {
        if buffer.capacity() > self.max_retained_capacity {
            return;
        }
        buffer.reset();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_idle {
            free.push(buffer);
        }
    }
}
