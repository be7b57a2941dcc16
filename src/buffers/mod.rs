//! Response copy buffers.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     BufferPool::new(max_connections, size_bytes)
//! Per proxied response:
//!     pool.acquire() → PooledBuffer → RelayBody copies upstream frames through it
//!     → body finished, failed or dropped → buffer returns to the pool
//! ```
//!
//! # Design Decisions
//! - Capacity equals the admission limit, so waiting for a buffer is bounded
//! - Owned and injected, never global; tests build tiny pools

pub mod pool;

pub use pool::{BufferPool, PooledBuffer};
