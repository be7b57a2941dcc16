//! Header manipulation.
//!
//! # Responsibilities
//! - Name the forwarded-address header the upstream refuses
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - Never forward X-Forwarded-For: the metadata server rejects it
//! - Headers listed in `Connection` are treated as hop-by-hop too
//! - Responses keep their `Trailer` announcement, since trailers are relayed

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// The forwarded-address header. Clients may not send it and the upstream
/// must never receive it.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Strip hop-by-hop headers from an upstream response, keeping `Trailer`.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    let announced: Vec<HeaderValue> = headers.get_all(header::TRAILER).iter().cloned().collect();
    strip_hop_by_hop(headers);
    for value in announced {
        headers.append(header::TRAILER, value);
    }
}
