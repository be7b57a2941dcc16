//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted TCP connection
//!     → server.rs (hyper HTTP/1.1 connection, Axum router)
//!     → policy engine decides Blocked or Proxied
//!     → Blocked: response.rs builds the 403
//!     → Proxied: upstream forwarder relays the request and response
//!     → response.rs finalizer records the outcome
//!     → Send to client
//! ```

pub mod response;
pub mod server;

pub use response::ResponseFinalizer;
pub use server::{AppState, HttpServer, ServerError};
