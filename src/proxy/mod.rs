//! HTTP fallback routing.
//!
//! Forwards each incoming request to the primary backend and, on timeout
//! or transport failure, to ordered fallback backends with rewritten
//! path prefixes.

mod fetch;
mod gateway;
mod request;
mod router;
mod target;
mod upstream;

#[cfg(test)]
pub(crate) mod testing;

pub use fetch::{
    fetch_with_timeout, FetchError, ForwardOptions, HttpUpstream, RedirectPolicy, Upstream,
    UpstreamResponse, DEFAULT_TIMEOUT,
};
pub use gateway::{handle, serve, GatewayError};
pub use request::IncomingRequest;
pub use router::{error_response, FallbackRouter, RouterOptions};
pub use target::{primary_url, rewrite_url, FallbackChain, TargetDescriptor};
pub use upstream::CircuitBreaker;
