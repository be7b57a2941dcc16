//! Outbound transport to the metadata server.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};

use crate::config::UpstreamConfig;
use crate::security::headers::X_FORWARDED_FOR;

/// Failure talking to the upstream.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

/// HTTP client for the single upstream.
///
/// Makes exactly one attempt per call. Strips `X-Forwarded-For` from every
/// request just before it is transmitted.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout()));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);

        Self {
            client,
            request_timeout: config.request_timeout(),
        }
    }

    /// Send `request` upstream. Its URI must already point at the upstream.
    pub async fn send(&self, mut request: Request<Body>) -> Result<Response<Incoming>, UpstreamError> {
        request.headers_mut().remove(X_FORWARDED_FOR);

        match tokio::time::timeout(self.request_timeout, self.client.request(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(UpstreamError::Timeout(self.request_timeout)),
        }
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
        let mut head = Vec::new();
        let mut chunk = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&head).into_owned()
    }

    async fn capturing_backend() -> (SocketAddr, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let head = read_head(&mut socket).await;
            let _ = tx.send(head);
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                .await;
        });
        (addr, rx)
    }

    fn config(timeout_secs: u64) -> UpstreamConfig {
        UpstreamConfig {
            request_timeout_secs: timeout_secs,
            ..UpstreamConfig::default()
        }
    }

    #[tokio::test]
    async fn strips_forwarded_for_before_sending() {
        let (addr, head) = capturing_backend().await;
        let client = UpstreamClient::new(&config(5));

        let request = Request::builder()
            .uri(format!("http://{addr}/computeMetadata/v1/instance/hostname"))
            .header("X-Forwarded-For", "10.0.0.7")
            .header("Metadata-Flavor", "Google")
            .body(Body::empty())
            .unwrap();

        let response = client.send(request).await.unwrap();
        assert_eq!(response.status(), 200);

        let head = head.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /computemetadata/v1/instance/hostname http/1.1"));
        assert!(head.contains("metadata-flavor: google"));
        assert!(!head.contains("x-forwarded-for"));
    }

    #[tokio::test]
    async fn silent_upstream_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = UpstreamClient::new(&config(1));
        let request = Request::builder()
            .uri(format!("http://{addr}/"))
            .body(Body::empty())
            .unwrap();

        let err = client.send(request).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let client = UpstreamClient::new(&config(5));
        let request = Request::builder()
            .uri(format!("http://{addr}/"))
            .body(Body::empty())
            .unwrap();

        let err = client.send(request).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport(_)));
    }
}
