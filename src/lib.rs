//! Edge fallback router.
//!
//! Forwards every incoming request to a primary backend. When the primary
//! times out or cannot be reached, the request is retried once against
//! each configured fallback host, in order, with a rewritten path prefix.

pub mod config;
pub mod health;
pub mod proxy;
