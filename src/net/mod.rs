//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (admission permit, accept, keep-alive)
//!     → connection.rs (id, live-connection tracking, read/write deadlines)
//!       (read deadline suspended while a response is pending)
//!     → Hand off to HTTP layer
//!
//! Connection lifetime:
//!     permit acquired → accepted → served → closed or timed out → permit released
//! ```
//!
//! # Design Decisions
//! - Bounded admission: the (N+1)-th connection waits, it is never refused
//! - Keep-alive probes reclaim slots held by vanished peers
//! - Deadlines reclaim slots held by stalled peers

pub mod connection;
pub mod listener;

pub use connection::{
    ConnectionGuard, ConnectionId, ConnectionTracker, DeadlineStream, InFlight, InFlightGuard,
};
pub use listener::{ConnectionPermit, Listener, ListenerError};
