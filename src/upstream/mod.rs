//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! Proxied request
//!     → forward.rs (rewrite URI to the target, strip hop-by-hop headers)
//!     → client.rs (strip X-Forwarded-For, single attempt with timeout)
//!     → metadata server
//! Upstream response
//!     → forward.rs (strip hop-by-hop headers, take a pooled buffer)
//!     → relay.rs (stream body through the buffer to the client)
//! ```
//!
//! # Design Decisions
//! - One fixed destination; only scheme and authority are rewritten
//! - No retries: failures surface as 502/504 and the client decides
//! - Bodies are streamed, never buffered whole

pub mod client;
pub mod forward;
pub mod relay;
pub mod target;

pub use client::{UpstreamClient, UpstreamError};
pub use forward::Forwarder;
pub use relay::RelayBody;
pub use target::{TargetError, UpstreamTarget};
