//! Outbound HTTP with a per-attempt deadline.
//!
//! `Upstream` is the transport seam. `HttpUpstream` sends real requests via
//! reqwest; tests substitute scripted implementations.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use url::Url;

use super::IncomingRequest;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Headers that describe a single hop and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
];

/// How redirects returned by an upstream are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Follow redirects and return the final response.
    #[default]
    Follow,
    /// Return 3xx responses to the caller as-is.
    Manual,
}

/// Per-attempt request parameters, built once and reused for every target.
#[derive(Debug, Clone)]
pub struct ForwardOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub redirect: RedirectPolicy,
    pub timeout: Duration,
}

impl ForwardOptions {
    /// Derives forwarding options from an inbound request.
    ///
    /// Redirects are followed unless overridden with `with_redirect`.
    pub fn from_request(req: &IncomingRequest, timeout: Duration) -> Self {
        Self {
            method: req.method.clone(),
            headers: strip_hop_by_hop(&req.headers),
            body: req.body.clone(),
            redirect: RedirectPolicy::Follow,
            timeout,
        }
    }

    pub fn with_redirect(mut self, redirect: RedirectPolicy) -> Self {
        self.redirect = redirect;
        self
    }
}

/// A fully received upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Failure of a single outbound attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request aborted after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Sends one request to one URL.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, url: &Url, opts: &ForwardOptions) -> Result<UpstreamResponse, FetchError>;
}

/// Sends a request and aborts it if it does not finish within `opts.timeout`.
///
/// The in-flight future is dropped when the deadline fires, which cancels
/// the underlying connection attempt.
pub async fn fetch_with_timeout(
    upstream: &dyn Upstream,
    url: &Url,
    opts: &ForwardOptions,
) -> Result<UpstreamResponse, FetchError> {
    match tokio::time::timeout(opts.timeout, upstream.send(url, opts)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(opts.timeout)),
    }
}

/// Returns a copy of `headers` without hop-by-hop entries.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP.iter() {
        out.remove(name);
    }
    out
}

/// reqwest-backed upstream.
///
/// Holds one client per redirect policy since reqwest fixes the policy
/// at build time.
pub struct HttpUpstream {
    follow: reqwest::Client,
    manual: reqwest::Client,
}

impl HttpUpstream {
    pub fn new() -> Result<Self, reqwest::Error> {
        let follow = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::default())
            .build()?;
        let manual = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { follow, manual })
    }

    fn client(&self, policy: RedirectPolicy) -> &reqwest::Client {
        match policy {
            RedirectPolicy::Follow => &self.follow,
            RedirectPolicy::Manual => &self.manual,
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, url: &Url, opts: &ForwardOptions) -> Result<UpstreamResponse, FetchError> {
        let mut request = self
            .client(opts.redirect)
            .request(opts.method.clone(), url.clone())
            .headers(opts.headers.clone());
        if !opts.body.is_empty() {
            request = request.body(opts.body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
