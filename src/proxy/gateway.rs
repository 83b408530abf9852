//! Edge entry point.
//!
//! Accepts HTTP/1 connections, normalizes each request into an
//! `IncomingRequest`, and hands it to the `FallbackRouter`. Every request
//! gets a response: normalization failures and panics inside the router
//! are turned into `500 Error`.

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use http::header::HOST;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use url::Url;

use super::router::error_response;
use super::{FallbackRouter, IncomingRequest};

/// Reasons an inbound request cannot be normalized.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request has no host")]
    MissingHost,

    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to read request body: {0}")]
    Body(String),
}

/// Builds an `IncomingRequest` from a hyper request, buffering the body.
///
/// The URL is reconstructed from the `Host` header (or the URI authority)
/// and the request's path and query.
pub async fn normalize<B>(req: Request<B>) -> Result<IncomingRequest, GatewayError>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();

    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()))
        .filter(|h| !h.is_empty())
        .ok_or(GatewayError::MissingHost)?;
    let scheme = parts.uri.scheme_str().unwrap_or("http");
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = Url::parse(&format!("{}://{}{}", scheme, host, path_and_query))?;

    let body = body
        .collect()
        .await
        .map_err(|e| GatewayError::Body(e.to_string()))?
        .to_bytes();

    Ok(IncomingRequest::new(parts.method, url, parts.headers, body))
}

/// Handles one inbound request. Never fails.
pub async fn handle<B>(
    router: Arc<FallbackRouter>,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match normalize(req).await {
        Ok(incoming) => match AssertUnwindSafe(router.route(&incoming)).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(method = %method, path = %path, "router panicked");
                error_response()
            }
        },
        Err(e) => {
            tracing::warn!(method = %method, path = %path, error = %e, "rejecting request");
            error_response()
        }
    };

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        "request completed"
    );

    Ok(response)
}

/// Serves the edge endpoint on `listener` until accepting fails.
pub async fn serve(listener: TcpListener, router: Arc<FallbackRouter>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let router = Arc::clone(&router);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&router), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, peer = %peer, "edge connection error");
            }
        });
    }
}
