//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Request allowed by policy:
//!     → headers.rs (strip hop-by-hop headers)
//!     → upstream client strips X-Forwarded-For right before sending
//! Upstream response:
//!     → headers.rs (strip hop-by-hop headers)
//! ```
//!
//! # Design Decisions
//! - No trust in client input: provenance headers are refused, not rewritten

pub mod headers;
