//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the metadata proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, admission limit, keep-alive).
    pub listener: ListenerConfig,

    /// The single metadata backend every allowed request goes to.
    pub upstream: UpstreamConfig,

    /// Per-connection deadlines.
    pub timeouts: TimeoutConfig,

    /// Response copy buffers.
    pub buffers: BufferConfig,

    /// Request filtering rule tables.
    pub policy: PolicyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:988").
    pub bind_address: String,

    /// Maximum concurrently served connections (backpressure).
    /// Also sizes the buffer pool.
    pub max_connections: usize,

    /// TCP keep-alive idle time and probe interval in seconds.
    pub keepalive_secs: u64,
}

impl ListenerConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:988".to_string(),
            max_connections: 100,
            keepalive_secs: 180,
        }
    }
}

/// Upstream metadata server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the metadata server. Only scheme and authority are used.
    pub url: String,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Time allowed for the upstream to produce response headers, in seconds.
    pub request_timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://169.254.169.254".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 60,
        }
    }
}

/// Deadlines applied to client connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Longest a single read from the client may stay pending, in seconds.
    pub read_secs: u64,

    /// Longest a single write to the client may stay pending, in seconds.
    pub write_secs: u64,

    /// How long in-flight connections may run after shutdown starts.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 60,
            write_secs: 60,
            shutdown_grace_secs: 10,
        }
    }
}

/// Response body copy buffers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Size of each pooled buffer in bytes.
    pub size_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            size_bytes: 32 * 1024,
        }
    }
}

/// Rule tables for the request policy.
///
/// Defaults cover the GCE metadata API families `0.1`, `v1beta1` and `v1`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Paths that are always blocked.
    pub concealed_paths: Vec<String>,

    /// Regular expressions (unanchored) for paths that are always blocked.
    pub concealed_patterns: Vec<String>,

    /// Path prefixes of known API versions that may be proxied.
    pub allowed_prefixes: Vec<String>,

    /// Directory listings outside the known prefixes that may be proxied.
    pub discovery_paths: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            concealed_paths: strings(&[
                "/0.1/meta-data/attributes/kube-env",
                "/computeMetadata/v1beta1/instance/attributes/kube-env",
                "/computeMetadata/v1/instance/attributes/kube-env",
            ]),
            concealed_patterns: strings(&[
                "/0.1/meta-data/service-accounts/.+/identity",
                "/computeMetadata/v1beta1/instance/service-accounts/.+/identity",
                "/computeMetadata/v1/instance/service-accounts/.+/identity",
            ]),
            allowed_prefixes: strings(&[
                "/0.1/meta-data/",
                "/computeMetadata/v1beta1/",
                "/computeMetadata/v1/",
            ]),
            discovery_paths: strings(&[
                "",
                "/",
                "/0.1",
                "/0.1/",
                "/0.1/meta-data",
                "/computeMetadata",
                "/computeMetadata/",
                "/computeMetadata/v1beta1",
                "/computeMetadata/v1",
            ]),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "127.0.0.1:989".to_string(),
        }
    }
}
