//! Fixed-capacity pool of fixed-size byte buffers.
//!
//! # Responsibilities
//! - Pre-allocate `capacity` buffers of `buffer_size` bytes at startup
//! - Hand out buffers, waiting when all are in use
//! - Take buffers back when their guard drops
//!
//! # Design Decisions
//! - A semaphore counts free buffers; a permit always has a buffer behind it
//! - Buffers are never resized or freed while the pool lives
//! - Return is tied to `Drop`, so error and cancellation paths release too

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
struct PoolInner {
    slots: Mutex<Vec<Box<[u8]>>>,
    available: Arc<Semaphore>,
    buffer_size: usize,
    capacity: usize,
}

impl PoolInner {
    fn take(&self) -> Box<[u8]> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buffer_size].into_boxed_slice())
    }

    fn put(&self, buf: Box<[u8]>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.push(buf);
    }
}

/// Shared handle to a buffer pool. Cloning shares the same buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool holding `capacity` buffers of `buffer_size` bytes each.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| vec![0u8; buffer_size].into_boxed_slice())
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(slots),
                available: Arc::new(Semaphore::new(capacity)),
                buffer_size,
                capacity,
            }),
        }
    }

    /// Take a buffer, waiting until one is returned if all are in use.
    pub async fn acquire(&self) -> PooledBuffer {
        let permit = self
            .inner
            .available
            .clone()
            .acquire_owned()
            .await
            .expect("buffer pool semaphore is never closed");
        self.checkout(permit)
    }

    /// Take a buffer if one is free right now.
    pub fn try_acquire(&self) -> Option<PooledBuffer> {
        let permit = self.inner.available.clone().try_acquire_owned().ok()?;
        Some(self.checkout(permit))
    }

    fn checkout(&self, permit: OwnedSemaphorePermit) -> PooledBuffer {
        PooledBuffer {
            buf: Some(self.inner.take()),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        }
    }

    /// Buffers currently free.
    pub fn available(&self) -> usize {
        self.inner.available.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }
}

/// A buffer on loan from a [`BufferPool`]. Returned to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Option<Box<[u8]>>,
    pool: Arc<PoolInner>,
    // Released after the buffer is back in the pool (fields drop after `Drop::drop`).
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}
