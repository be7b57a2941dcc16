//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use metadata_proxy::config::ProxyConfig;
use metadata_proxy::lifecycle::{self, Shutdown};
use metadata_proxy::observability::metrics::MemoryRecorder;

/// Request heads received by a mock upstream, lowercased.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<String>>>);

impl Captured {
    pub fn heads(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Start a mock metadata server answering every request with `status` and `body`.
pub async fn start_mock_upstream(status: u16, body: &'static str) -> (SocketAddr, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Captured::default();
    let sink = captured.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                sink.0
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&head).to_lowercase());

                let response = format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Type: text/plain\r\nMetadata-Flavor: Google\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, captured)
}

/// Start a mock metadata server that reads requests and never answers.
pub async fn start_silent_upstream() -> (SocketAddr, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Captured::default();
    let sink = captured.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 1024];
                if let Ok(n) = socket.read(&mut chunk).await {
                    sink.0
                        .lock()
                        .unwrap()
                        .push(String::from_utf8_lossy(&chunk[..n]).to_lowercase());
                }
                // Hold the socket open until the peer gives up.
                while let Ok(n) = socket.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });

    (addr, captured)
}

/// Wait until `recorder` has seen `total` outcomes, or panic after `limit`.
pub async fn wait_for_total(recorder: &MemoryRecorder, total: u64, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while recorder.total() < total {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {total} recorded outcomes, saw {}",
            recorder.total()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A running proxy bound to an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub recorder: Arc<MemoryRecorder>,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to return.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should stop")
            .unwrap();
    }
}

/// Config pointing at `upstream`, listening on an ephemeral port, metrics off.
pub fn test_config(upstream: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.url = format!("http://{upstream}");
    config.upstream.request_timeout_secs = 5;
    config.timeouts.shutdown_grace_secs = 1;
    config.observability.metrics_enabled = false;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let recorder = Arc::new(MemoryRecorder::new());
    let (server, listener) = lifecycle::prepare(config, recorder.clone()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, receiver).await.unwrap();
    });

    TestProxy {
        addr,
        recorder,
        shutdown,
        handle,
    }
}

/// Client that bypasses any environment proxy and never reuses connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
