//! Per-target circuit tracking.
//!
//! A target that fails is marked unhealthy with a timestamp. Until the
//! reset window elapses, the router skips it. A single success closes
//! the circuit again.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::FallbackChain;

/// Circuit state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CircuitState {
    Closed,
    Open,
}

/// Tracks recently failed targets.
///
/// Thread-safe via DashMap. Unknown targets are considered available.
pub struct CircuitBreaker {
    opened_at: DashMap<String, Instant>,
    reset: Duration,
}

impl CircuitBreaker {
    /// Creates a breaker whose circuits close again after `reset`.
    pub fn new(reset: Duration) -> Self {
        Self {
            opened_at: DashMap::new(),
            reset,
        }
    }

    /// Records a successful attempt, closing the target's circuit.
    pub fn record_success(&self, key: &str) {
        self.opened_at.remove(key);
    }

    /// Records a failed attempt, opening the target's circuit.
    pub fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Instant::now());
    }

    fn record_failure_at(&self, key: &str, at: Instant) {
        self.opened_at.insert(key.to_string(), at);
    }

    /// Returns the circuit state of a target.
    pub(crate) fn state(&self, key: &str) -> CircuitState {
        self.state_at(key, Instant::now())
    }

    fn state_at(&self, key: &str, now: Instant) -> CircuitState {
        match self.opened_at.get(key) {
            Some(opened) if now.saturating_duration_since(*opened) < self.reset => {
                CircuitState::Open
            }
            _ => CircuitState::Closed,
        }
    }

    /// Returns whether the router may attempt this target.
    pub fn is_available(&self, key: &str) -> bool {
        self.state(key) == CircuitState::Closed
    }

    /// Returns the number of targets in `chain` with a closed circuit.
    pub fn available_count(&self, chain: &FallbackChain) -> usize {
        chain.iter().filter(|t| self.is_available(t.key())).count()
    }

    /// How long a failed target stays skipped.
    pub fn reset_window(&self) -> Duration {
        self.reset
    }
}
