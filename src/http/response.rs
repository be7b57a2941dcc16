//! Response construction and finalization.
//!
//! # Responsibilities
//! - Build plain-text error responses for blocked requests and gateway failures
//! - Record each request's outcome exactly once, from the response actually sent
//!
//! # Design Decisions
//! - `ResponseFinalizer::finalize` consumes the finalizer, so a request path
//!   cannot record twice
//! - The recorded status is read from the final response, after upstream
//!   errors have been mapped to gateway statuses
//! - A finalizer dropped without `finalize` (the client went away while the
//!   handler was waiting) records 502, the status the request would have
//!   been answered with

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::observability::metrics::{FilterResult, OutcomeRecorder};
use crate::policy::BlockReason;

/// Records the outcome of one request when its response is final.
#[must_use = "every response path must call finalize"]
pub struct ResponseFinalizer {
    recorder: Arc<dyn OutcomeRecorder>,
    filter_result: FilterResult,
    done: bool,
}

impl ResponseFinalizer {
    pub fn new(recorder: Arc<dyn OutcomeRecorder>, filter_result: FilterResult) -> Self {
        Self {
            recorder,
            filter_result,
            done: false,
        }
    }

    /// Record the status of `response` and hand it back for writing.
    pub fn finalize(mut self, response: Response) -> Response {
        self.recorder.record(self.filter_result, response.status());
        self.done = true;
        response
    }
}

impl Drop for ResponseFinalizer {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(filter_result = %self.filter_result, "Request abandoned before a response");
            self.recorder.record(self.filter_result, StatusCode::BAD_GATEWAY);
        }
    }
}

/// A plain-text error body, newline terminated.
fn text_error(status: StatusCode, body: String) -> Response {
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

/// Response for a request refused by policy.
pub fn blocked_response(status: StatusCode, reason: BlockReason) -> Response {
    text_error(status, format!("{}: {}\n", reason.label(), reason.message()))
}

/// Response for a request the upstream could not serve.
pub fn gateway_error(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Gateway Error");
    text_error(status, format!("{reason}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::MemoryRecorder;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn blocked_response_names_reason() {
        let response = blocked_response(StatusCode::FORBIDDEN, BlockReason::Concealed);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        let body = body_text(response).await;
        assert!(body.starts_with("concealed: "));
        assert!(body.ends_with('\n'));
    }

    #[tokio::test]
    async fn every_reason_label_leads_the_body() {
        for reason in [
            BlockReason::ForwardedHeader,
            BlockReason::Recursive,
            BlockReason::Concealed,
            BlockReason::UnknownApi,
        ] {
            let body = body_text(blocked_response(StatusCode::FORBIDDEN, reason)).await;
            assert!(body.starts_with(reason.label()), "{body}");
        }
    }

    #[tokio::test]
    async fn gateway_error_body() {
        let response = gateway_error(StatusCode::BAD_GATEWAY);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_text(response).await, "Bad Gateway\n");
    }

    #[test]
    fn finalize_records_the_final_status() {
        let recorder = Arc::new(MemoryRecorder::new());
        let finalizer = ResponseFinalizer::new(recorder.clone(), FilterResult::Proxied);

        let response = finalizer.finalize(gateway_error(StatusCode::GATEWAY_TIMEOUT));

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(recorder.count(FilterResult::Proxied, 504), 1);
        assert_eq!(recorder.total(), 1);
    }

    #[test]
    fn abandoned_finalizer_records_bad_gateway_once() {
        let recorder = Arc::new(MemoryRecorder::new());
        drop(ResponseFinalizer::new(recorder.clone(), FilterResult::Proxied));

        assert_eq!(recorder.count(FilterResult::Proxied, 502), 1);
        assert_eq!(recorder.total(), 1);
    }

    #[tokio::test]
    async fn cancelled_handler_future_records_once() {
        let recorder = Arc::new(MemoryRecorder::new());
        let finalizer = ResponseFinalizer::new(recorder.clone(), FilterResult::Proxied);
        let handler = async move {
            std::future::pending::<()>().await;
            finalizer.finalize(gateway_error(StatusCode::GATEWAY_TIMEOUT))
        };

        let outcome = tokio::time::timeout(std::time::Duration::from_millis(20), handler).await;
        assert!(outcome.is_err());
        assert_eq!(recorder.count(FilterResult::Proxied, 502), 1);
        assert_eq!(recorder.total(), 1);
    }
}
