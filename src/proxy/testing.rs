//! Test doubles shared by the proxy test modules.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use url::Url;

use super::fetch::{FetchError, ForwardOptions, RedirectPolicy, Upstream, UpstreamResponse};

/// Scripted behavior for one upstream host.
#[derive(Debug, Clone)]
pub enum Script {
    Respond {
        delay: Duration,
        status: StatusCode,
        body: &'static str,
    },
    Fail,
    Hang,
    Panic,
}

impl Script {
    pub fn ok(body: &'static str) -> Self {
        Self::Respond {
            delay: Duration::ZERO,
            status: StatusCode::OK,
            body,
        }
    }

    pub fn status(status: StatusCode, body: &'static str) -> Self {
        Self::Respond {
            delay: Duration::ZERO,
            status,
            body,
        }
    }

    pub fn delayed(delay_ms: u64, status: StatusCode, body: &'static str) -> Self {
        Self::Respond {
            delay: Duration::from_millis(delay_ms),
            status,
            body,
        }
    }
}

/// An outbound call observed by `ScriptedUpstream`.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub redirect: RedirectPolicy,
}

/// Upstream whose behavior is scripted per host. Unknown hosts fail.
#[derive(Default)]
pub struct ScriptedUpstream {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, script: Script) -> Self {
        self.scripts.insert(host.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.url).collect()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn send(&self, url: &Url, opts: &ForwardOptions) -> Result<UpstreamResponse, FetchError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: opts.method.clone(),
            url: url.to_string(),
            headers: opts.headers.clone(),
            body: opts.body.clone(),
            redirect: opts.redirect,
        });

        let host = url.host_str().unwrap_or_default();
        match self.scripts.get(host).cloned().unwrap_or(Script::Fail) {
            Script::Respond {
                delay,
                status,
                body,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let mut headers = HeaderMap::new();
                headers.insert("x-served-by", host.parse().unwrap());
                Ok(UpstreamResponse {
                    status,
                    headers,
                    body: Bytes::from_static(body.as_bytes()),
                })
            }
            Script::Fail => Err(FetchError::Transport(format!("connection refused: {}", host))),
            Script::Hang => std::future::pending().await,
            Script::Panic => panic!("scripted panic for {}", host),
        }
    }
}

/// Starts a hyper HTTP/1 server on an ephemeral port and returns its address.
pub async fn spawn_stub<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(Request<hyper::body::Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let fut = (*handler)(req);
                    async move { Ok::<_, Infallible>(fut.await) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// Simple HTTP/1.1 exchange over a raw socket. Returns (status, body).
pub async fn raw_request(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, String) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        addr,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status_line = response.lines().next().unwrap();
    let status_code: u16 = status_line
        .split_whitespace()
        .nth(1)
        .unwrap()
        .parse()
        .unwrap();

    let body = response
        .split("\r\n\r\n")
        .nth(1)
        .unwrap_or("")
        .to_string();

    (status_code, body)
}
