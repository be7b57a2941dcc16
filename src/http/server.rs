//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Accept admitted connections and serve each on its own task
//! - Apply read/write deadlines and HTTP/1.1 keep-alive per connection
//! - Create the Axum router with the metadata handler
//! - Classify each request and either answer it or forward it
//! - Record every outcome exactly once
//! - Stop accepting and drain connections on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::buffers::BufferPool;
use crate::config::{ProxyConfig, TimeoutConfig};
use crate::http::response::{blocked_response, ResponseFinalizer};
use crate::net::{
    ConnectionGuard, ConnectionPermit, ConnectionTracker, DeadlineStream, InFlight, Listener,
    ListenerError,
};
use crate::observability::metrics::{self as proxy_metrics, OutcomeRecorder};
use crate::policy::{Decision, PolicyEngine, PolicyError};
use crate::upstream::{Forwarder, TargetError, UpstreamClient, UpstreamTarget};

const MIN_ACCEPT_DELAY: Duration = Duration::from_millis(5);
const MAX_ACCEPT_DELAY: Duration = Duration::from_secs(1);

/// Error building or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<PolicyEngine>,
    pub forwarder: Forwarder,
    pub recorder: Arc<dyn OutcomeRecorder>,
}

/// HTTP server for the metadata proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig, recorder: Arc<dyn OutcomeRecorder>) -> Result<Self, ServerError> {
        let policy = Arc::new(PolicyEngine::from_config(&config.policy)?);
        let target = UpstreamTarget::parse(&config.upstream.url)?;

        // One buffer per admissible connection.
        let buffers = BufferPool::new(config.listener.max_connections, config.buffers.size_bytes);
        let forwarder = Forwarder::new(target, UpstreamClient::new(&config.upstream), buffers);

        let state = AppState {
            policy,
            forwarder,
            recorder,
        };

        Ok(Self {
            router: Self::build_router(state),
            config,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Build the Axum router. Every method and path reaches the handler.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(metadata_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then drain open connections.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                address = %addr,
                upstream = %self.config.upstream.url,
                "HTTP server starting"
            );
        }

        let mut accept_delay: Option<Duration> = None;

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    accept_delay = None;
                    let guard = self.tracker.track();
                    let span = tracing::debug_span!("connection", id = %guard.id(), peer = %peer);
                    tokio::spawn(
                        serve_connection(
                            stream,
                            self.router.clone(),
                            self.config.timeouts.clone(),
                            shutdown.resubscribe(),
                            permit,
                            guard,
                        )
                        .instrument(span),
                    );
                }
                Err(ListenerError::Accept(e)) => {
                    let delay = accept_delay.map_or(MIN_ACCEPT_DELAY, |d| (d * 2).min(MAX_ACCEPT_DELAY));
                    accept_delay = Some(delay);
                    tracing::warn!(error = %e, retry_in = ?delay, "Accept failed");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        drop(listener);

        let grace = self.config.timeouts.shutdown_grace();
        if tokio::time::timeout(grace, self.tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                open_connections = self.tracker.active_count(),
                "Shutdown grace period elapsed with connections still open"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Serve one client connection. The permit and guard are released when this returns.
async fn serve_connection(
    stream: TcpStream,
    router: Router,
    timeouts: TimeoutConfig,
    mut shutdown: broadcast::Receiver<()>,
    _permit: ConnectionPermit,
    _guard: ConnectionGuard,
) {
    proxy_metrics::connection_opened();

    // Waiting on the upstream is bounded by its own timeout, not the client read deadline.
    let in_flight = InFlight::new();
    let io = TokioIo::new(
        DeadlineStream::new(stream, timeouts.read(), timeouts.write()).with_in_flight(in_flight.clone()),
    );
    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        let busy = in_flight.enter();
        let response = router.clone().oneshot(request);
        async move {
            let response = response.await;
            drop(busy);
            response
        }
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read())
        .keep_alive(true)
        .serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Connection closed with error");
    }

    proxy_metrics::connection_closed();
}

/// Classify the request, then answer it directly or relay it upstream.
async fn metadata_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let decision = state.policy.evaluate(
        request.uri().path(),
        request.uri().query(),
        request.headers(),
    );

    tracing::info!(
        method = %request.method(),
        path = %request.uri().path(),
        filter_result = %decision.filter_result(),
        "Request"
    );

    let finalizer = ResponseFinalizer::new(Arc::clone(&state.recorder), decision.filter_result());

    match decision {
        Decision::Blocked { status, reason } => {
            tracing::debug!(reason = %reason, "Request blocked");
            finalizer.finalize(blocked_response(status, reason))
        }
        Decision::Proxied => {
            let response = state.forwarder.forward(request).await;
            finalizer.finalize(response)
        }
    }
}
