//! Forwarding of allowed requests.

use axum::body::Body;
use axum::http::{Request, StatusCode, Version};
use axum::response::Response;

use crate::buffers::BufferPool;
use crate::http::response::gateway_error;
use crate::security::headers::{strip_hop_by_hop, strip_response_hop_by_hop};
use crate::upstream::client::{UpstreamClient, UpstreamError};
use crate::upstream::relay::RelayBody;
use crate::upstream::target::UpstreamTarget;

/// Relays requests to the fixed upstream and streams responses back.
#[derive(Debug, Clone)]
pub struct Forwarder {
    target: UpstreamTarget,
    client: UpstreamClient,
    buffers: BufferPool,
}

impl Forwarder {
    pub fn new(target: UpstreamTarget, client: UpstreamClient, buffers: BufferPool) -> Self {
        Self {
            target,
            client,
            buffers,
        }
    }

    /// Forward `request` and build the client response.
    ///
    /// Transport failures become 502, upstream timeouts 504. One attempt only.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let (mut parts, body) = request.into_parts();

        parts.uri = match self.target.rewrite(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(uri = %parts.uri, error = %e, "Failed to rewrite request URI");
                return gateway_error(StatusCode::BAD_GATEWAY);
            }
        };
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);

        let response = match self.client.send(Request::from_parts(parts, body)).await {
            Ok(response) => response,
            Err(e @ UpstreamError::Timeout(_)) => {
                tracing::warn!(upstream = %self.target, error = %e, "Upstream timed out");
                return gateway_error(StatusCode::GATEWAY_TIMEOUT);
            }
            Err(e) => {
                tracing::error!(upstream = %self.target, error = %e, "Upstream error");
                return gateway_error(StatusCode::BAD_GATEWAY);
            }
        };

        let (mut parts, body) = response.into_parts();
        strip_response_hop_by_hop(&mut parts.headers);

        let buffer = self.buffers.acquire().await;
        Response::from_parts(parts, Body::new(RelayBody::new(Body::new(body), buffer)))
    }
}
