//! Request policy subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (path, query, headers)
//!     → engine.rs (ordered stages, first match wins)
//!     → rules.rs (header, query, exact, pattern and prefix predicates)
//!     → Decision: Blocked { status, reason } | Proxied
//!
//! Stage order:
//!     forwarded header → recursive query → concealed paths
//!     → concealed patterns → allowed prefixes → discovery paths
//!     → (default) unknown API
//! ```
//!
//! # Design Decisions
//! - Rule tables compiled at startup, immutable at runtime
//! - No I/O, no locks: evaluation is a pure function of the request
//! - Default deny: unknown API versions are never forwarded

pub mod engine;
pub mod rules;

pub use engine::{stage, BlockReason, Decision, PolicyEngine, PolicyError};
pub use rules::{RequestView, Rule};
