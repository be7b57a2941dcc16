//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count every completed request by filter result and status code
//! - Track the number of connections being served
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `metadata_proxy_requests_total` (counter): labels `filter_result`, `code`
//! - `metadata_proxy_active_connections` (gauge): current connection count
//!
//! # Design Decisions
//! - Recording goes through the `OutcomeRecorder` trait so tests can observe it
//! - Low-overhead metric updates (atomic operations), never blocking a request

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use axum::http::StatusCode;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "metadata_proxy_requests_total";
pub const ACTIVE_CONNECTIONS: &str = "metadata_proxy_active_connections";

/// Policy classification attached to every completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterResult {
    Blocked,
    Proxied,
}

impl FilterResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterResult::Blocked => "blocked",
            FilterResult::Proxied => "proxied",
        }
    }
}

impl std::fmt::Display for FilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for request outcomes.
///
/// Implementations must not block and must not fail the request.
pub trait OutcomeRecorder: Send + Sync {
    fn record(&self, filter_result: FilterResult, status: StatusCode);
}

/// Records outcomes into the global `metrics` registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusRecorder;

impl OutcomeRecorder for PrometheusRecorder {
    fn record(&self, filter_result: FilterResult, status: StatusCode) {
        metrics::counter!(
            REQUESTS_TOTAL,
            "filter_result" => filter_result.as_str(),
            "code" => status.as_u16().to_string()
        )
        .increment(1);
    }
}

/// Keeps outcome counts in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    counts: Mutex<HashMap<(FilterResult, u16), u64>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for one label pair.
    pub fn count(&self, filter_result: FilterResult, status: u16) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.get(&(filter_result, status)).copied().unwrap_or(0)
    }

    /// Count across all label pairs.
    pub fn total(&self) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.values().sum()
    }
}

impl OutcomeRecorder for MemoryRecorder {
    fn record(&self, filter_result: FilterResult, status: StatusCode) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry((filter_result, status.as_u16())).or_insert(0) += 1;
    }
}

/// Install the Prometheus exporter with an HTTP scrape endpoint at `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!(REQUESTS_TOTAL, "Requests handled, by filter result and status code");
    metrics::describe_gauge!(ACTIVE_CONNECTIONS, "Client connections currently being served");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn connection_opened() {
    metrics::gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_recorder_counts_label_pairs() {
        let recorder = MemoryRecorder::new();
        recorder.record(FilterResult::Blocked, StatusCode::FORBIDDEN);
        recorder.record(FilterResult::Blocked, StatusCode::FORBIDDEN);
        recorder.record(FilterResult::Proxied, StatusCode::OK);

        assert_eq!(recorder.count(FilterResult::Blocked, 403), 2);
        assert_eq!(recorder.count(FilterResult::Proxied, 200), 1);
        assert_eq!(recorder.count(FilterResult::Proxied, 403), 0);
        assert_eq!(recorder.total(), 3);
    }

    #[test]
    fn filter_result_labels() {
        assert_eq!(FilterResult::Blocked.to_string(), "blocked");
        assert_eq!(FilterResult::Proxied.as_str(), "proxied");
    }

    #[test]
    fn prometheus_recorder_without_exporter_is_a_no_op() {
        PrometheusRecorder.record(FilterResult::Proxied, StatusCode::BAD_GATEWAY);
    }
}
