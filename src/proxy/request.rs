//! Normalized inbound request.

use bytes::Bytes;
use http::{HeaderMap, Method};
use url::Url;

/// A request received at the edge, normalized once before routing.
///
/// The body is fully buffered so every attempt in the fallback chain
/// can replay it.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IncomingRequest {
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }
}
