//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use url::Url;

use crate::proxy::{FallbackChain, RedirectPolicy, RouterOptions, TargetDescriptor};

/// Invalid configuration detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid target '{spec}': {reason}")]
    InvalidTarget { spec: String, reason: String },

    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// Edge router that forwards requests to a primary backend and falls back
/// to ordered backup hosts.
#[derive(Debug, Parser)]
#[command(name = "fallback-router", version, about)]
pub struct Config {
    /// Address the edge endpoint listens on.
    #[arg(long, env = "FALLBACK_ROUTER_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Address the health endpoints listen on.
    #[arg(long, env = "FALLBACK_ROUTER_HEALTH_LISTEN", default_value = "0.0.0.0:8081")]
    pub health_listen: SocketAddr,

    /// Primary backend origin, e.g. `https://xyz.supabase.co`.
    #[arg(long, env = "FALLBACK_ROUTER_PRIMARY")]
    pub primary: String,

    /// Fallback backend as `ORIGIN=PREFIX`, tried in the order given.
    #[arg(long = "fallback", env = "FALLBACK_ROUTER_FALLBACKS", value_delimiter = ',')]
    pub fallbacks: Vec<String>,

    /// Per-attempt timeout in milliseconds.
    #[arg(long, env = "FALLBACK_ROUTER_TIMEOUT_MS", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Skip targets that failed within this many seconds.
    #[arg(long, env = "FALLBACK_ROUTER_CIRCUIT_RESET_SECS")]
    pub circuit_reset_secs: Option<u64>,

    /// Treat 5xx responses as failures and try the next target.
    #[arg(long, env = "FALLBACK_ROUTER_FAIL_ON_SERVER_ERROR")]
    pub fail_on_server_error: bool,

    /// Return upstream redirects to the caller instead of following them.
    #[arg(long, env = "FALLBACK_ROUTER_MANUAL_REDIRECTS")]
    pub manual_redirects: bool,
}

impl Config {
    /// Builds the fallback chain from the configured targets.
    pub fn chain(&self) -> Result<FallbackChain, ConfigError> {
        let primary = TargetDescriptor::new(parse_origin(&self.primary)?, "");
        let fallbacks = self
            .fallbacks
            .iter()
            .map(|spec| parse_target(spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FallbackChain::new(primary, fallbacks))
    }

    /// Builds router options from the configured tunables.
    pub fn router_options(&self) -> Result<RouterOptions, ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(RouterOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            fail_on_server_error: self.fail_on_server_error,
            circuit_reset: self.circuit_reset_secs.map(Duration::from_secs),
            redirect: if self.manual_redirects {
                RedirectPolicy::Manual
            } else {
                RedirectPolicy::Follow
            },
        })
    }
}

/// Parses a fallback spec of the form `ORIGIN=PREFIX`.
///
/// The prefix is kept verbatim apart from surrounding slashes.
pub fn parse_target(spec: &str) -> Result<TargetDescriptor, ConfigError> {
    let (origin, prefix) = spec.rsplit_once('=').ok_or_else(|| ConfigError::InvalidTarget {
        spec: spec.to_string(),
        reason: "expected ORIGIN=PREFIX".to_string(),
    })?;
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        return Err(ConfigError::InvalidTarget {
            spec: spec.to_string(),
            reason: "empty path prefix".to_string(),
        });
    }
    Ok(TargetDescriptor::new(parse_origin(origin)?, prefix))
}

/// Parses an `http` or `https` origin with a host.
fn parse_origin(origin: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTarget {
        spec: origin.to_string(),
        reason,
    };

    let url = Url::parse(origin.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
