//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build the policy engine, upstream forwarder and buffer pool
//! - Bind the listener last, so traffic arrives only when ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Every validation problem is reported at once

use std::sync::Arc;

use crate::config::{validate_config, ProxyConfig, ValidationError};
use crate::http::{HttpServer, ServerError};
use crate::net::{Listener, ListenerError};
use crate::observability::metrics::OutcomeRecorder;

/// Error preventing the proxy from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Config(Vec<ValidationError>),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate `config`, build the server and bind its listener.
pub async fn prepare(
    config: ProxyConfig,
    recorder: Arc<dyn OutcomeRecorder>,
) -> Result<(HttpServer, Listener), StartupError> {
    validate_config(&config).map_err(StartupError::Config)?;

    let server = HttpServer::new(config, recorder)?;
    let listener = Listener::bind(&server.config().listener).await?;

    tracing::info!(
        max_connections = server.config().listener.max_connections,
        buffer_size = server.config().buffers.size_bytes,
        "Startup complete"
    );

    Ok((server, listener))
}
