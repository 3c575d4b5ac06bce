//! Header handling between client, sidecar and upstream.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use indexmap::IndexMap;
use uuid::Uuid;

/// Header name for request ID.
pub static HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Hop-by-hop headers (HTTP/1.1) plus headers the HTTP client recomputes.
pub static FILTERED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Check if a header is hop-by-hop (should not be forwarded).
pub fn is_hop_by_hop_header(name: &str) -> bool {
    let name_lower = name.to_ascii_lowercase();
    FILTERED_HEADERS.contains(&name_lower.as_str())
}

/// Filter headers for forwarding in either direction.
pub fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop_header(name.as_str()) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Reuse the inbound request id, or mint a new one.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(&HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::now_v7().to_string(), ToString::to_string)
}

/// Set the request id on an outgoing header map.
pub fn set_request_id(headers: &mut HeaderMap, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HEADER_REQUEST_ID.clone(), value);
    }
}

/// Headers as the ordered name/value map the authorizers read.
///
/// Non-UTF-8 values are skipped; repeated headers keep the first value.
pub fn authz_headers(headers: &HeaderMap) -> IndexMap<String, String> {
    let mut map = IndexMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    map
}
