//! Sequential fallback routing.
//!
//! Tries the primary target, then each fallback in configured order,
//! stopping at the first success. Attempts never overlap: each one is
//! resolved before the next begins, and each gets its own timeout.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{Method, Response, StatusCode};
use http_body_util::Full;
use url::Url;

use super::fetch::{
    fetch_with_timeout, strip_hop_by_hop, ForwardOptions, RedirectPolicy, Upstream,
    UpstreamResponse, DEFAULT_TIMEOUT,
};
use super::target::{primary_url, rewrite_url};
use super::upstream::CircuitBreaker;
use super::{FallbackChain, IncomingRequest, TargetDescriptor};

/// Body returned when no target could serve the request.
pub const EXHAUSTED_BODY: &str = "Error";

/// Tunables for the fallback router.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Deadline for each individual attempt.
    pub timeout: Duration,
    /// Treat 5xx upstream responses as failures and move on.
    pub fail_on_server_error: bool,
    /// Skip targets that failed within this window. `None` disables it.
    pub circuit_reset: Option<Duration>,
    /// Redirect handling for every attempt.
    pub redirect: RedirectPolicy,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            fail_on_server_error: false,
            circuit_reset: None,
            redirect: RedirectPolicy::Follow,
        }
    }
}

/// The response that served a request, and which target produced it.
#[derive(Debug)]
pub struct Served {
    pub index: usize,
    pub url: Url,
    pub response: UpstreamResponse,
}

/// Routes requests through an ordered fallback chain.
pub struct FallbackRouter {
    chain: Arc<FallbackChain>,
    upstream: Arc<dyn Upstream>,
    options: RouterOptions,
    breaker: Option<CircuitBreaker>,
}

impl FallbackRouter {
    /// Creates a router over `chain`, sending requests through `upstream`.
    pub fn new(chain: Arc<FallbackChain>, upstream: Arc<dyn Upstream>, options: RouterOptions) -> Self {
        let breaker = options.circuit_reset.map(CircuitBreaker::new);
        Self {
            chain,
            upstream,
            options,
            breaker,
        }
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Returns whether at least one target may currently be attempted.
    pub fn has_available_target(&self) -> bool {
        match &self.breaker {
            Some(breaker) => breaker.available_count(&self.chain) > 0,
            None => true,
        }
    }

    /// Computes the URL for the target at `index`.
    ///
    /// The primary (index 0) keeps the original path; fallbacks are rewritten.
    pub fn target_url(index: usize, target: &TargetDescriptor, original: &Url) -> Url {
        if index == 0 {
            primary_url(original, target)
        } else {
            rewrite_url(original, target)
        }
    }

    /// Walks the chain and returns the first successful response.
    ///
    /// Returns `None` when every target failed or was skipped.
    pub async fn dispatch(&self, req: &IncomingRequest) -> Option<Served> {
        let opts = ForwardOptions::from_request(req, self.options.timeout)
            .with_redirect(self.options.redirect);

        for (index, target) in self.chain.iter().enumerate() {
            if let Some(breaker) = &self.breaker {
                if !breaker.is_available(target.key()) {
                    tracing::info!(attempt = index, upstream = target.key(), "skipping target, circuit open");
                    continue;
                }
            }

            let url = Self::target_url(index, target, &req.url);
            match fetch_with_timeout(self.upstream.as_ref(), &url, &opts).await {
                Ok(response)
                    if self.options.fail_on_server_error && response.status.is_server_error() =>
                {
                    tracing::warn!(
                        attempt = index,
                        upstream = %url,
                        status = response.status.as_u16(),
                        "target returned server error"
                    );
                    self.record_failure(target);
                }
                Ok(response) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success(target.key());
                    }
                    tracing::info!(attempt = index, upstream = %url, "request served");
                    return Some(Served {
                        index,
                        url,
                        response,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt = index, upstream = %url, error = %e, "target failed");
                    self.record_failure(target);
                }
            }
        }

        None
    }

    /// Routes a request and always produces a response.
    ///
    /// The first successful upstream response is returned unchanged; if
    /// the chain is exhausted, the response is `500 Error`.
    pub async fn route(&self, req: &IncomingRequest) -> Response<Full<Bytes>> {
        match self.dispatch(req).await {
            Some(served) => into_response(served.response, &req.method),
            None => {
                tracing::error!(
                    method = %req.method,
                    url = %req.url,
                    targets = self.chain.len(),
                    "all targets failed"
                );
                error_response()
            }
        }
    }

    fn record_failure(&self, target: &TargetDescriptor) {
        if let Some(breaker) = &self.breaker {
            breaker.record_failure(target.key());
        }
    }
}

/// The opaque response sent when routing fails.
pub fn error_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(EXHAUSTED_BODY.as_bytes())));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Converts an upstream response into one sent back to the caller.
///
/// Framing headers are dropped since the body is re-framed on the way out.
/// `content-length` survives on HEAD and 304 responses, where it describes
/// a body that is never sent.
pub fn into_response(upstream: UpstreamResponse, method: &Method) -> Response<Full<Bytes>> {
    let mut headers = strip_hop_by_hop(&upstream.headers);
    if *method == Method::HEAD || upstream.status == StatusCode::NOT_MODIFIED {
        if let Some(length) = upstream.headers.get(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, length.clone());
        }
    }

    let mut response = Response::new(Full::new(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = headers;
    response
}
