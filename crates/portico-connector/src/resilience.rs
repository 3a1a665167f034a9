//! Resilience for connector operations.
//!
//! Per-instance circuit breaker with an in-flight concurrency cap and a
//! per-call timeout. All counters are local to one breaker; there is no
//! cross-breaker state.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::CircuitState;

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Successful probes required to close a half-open circuit.
    pub success_threshold: u32,
    /// Time the circuit stays open before admitting a probe.
    pub half_open_after: Duration,
    /// Maximum in-flight calls.
    pub max_concurrent: u32,
    /// Default per-call timeout.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            half_open_after: Duration::from_millis(10_000),
            max_concurrent: 20,
            timeout: Duration::from_millis(30_000),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker protecting one connector instance.
///
/// Fails fast while the backend is considered down and probes recovery
/// after a cool-down. Every admitted call races against the configured
/// timeout; timeouts count as failures.
#[derive(Debug)]
pub struct CircuitBreaker {
    connector_id: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    in_flight: Arc<AtomicU32>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(connector_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            connector_id: connector_id.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
            in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Create a new circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults(connector_id: impl Into<String>) -> Self {
        Self::new(connector_id, CircuitBreakerConfig::default())
    }

    /// The connector instance this breaker protects.
    #[must_use]
    pub fn connector_id(&self) -> &str {
        &self.connector_id
    }

    /// The breaker configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying the open → half-open transition if due.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Snapshot of counters for logging and introspection.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        BreakerSnapshot {
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            in_flight: self.in_flight.load(Ordering::SeqCst),
        }
    }

    /// Execute an operation under the breaker with the default timeout.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ConnectorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConnectorResult<T>>,
    {
        self.execute_with_timeout(self.config.timeout, operation).await
    }

    /// Execute an operation under the breaker with a per-call timeout.
    pub async fn execute_with_timeout<F, Fut, T>(
        &self,
        timeout: Duration,
        operation: F,
    ) -> ConnectorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConnectorResult<T>>,
    {
        let _guard = self.try_acquire()?;

        match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(result)) => {
                self.on_success();
                Ok(result)
            }
            Ok(Err(e)) => {
                if Self::counts_as_failure(&e) {
                    self.on_failure();
                }
                Err(e)
            }
            Err(_) => {
                self.on_failure();
                Err(ConnectorError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Reset the breaker to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.successes = 0;
        inner.opened_at = None;
    }

    fn counts_as_failure(error: &ConnectorError) -> bool {
        matches!(
            error,
            ConnectorError::Backend { .. } | ConnectorError::Timeout { .. }
        )
    }

    /// Admission check: state gate first, then the concurrency cap.
    fn try_acquire(&self) -> ConnectorResult<InFlightGuard> {
        {
            let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            self.maybe_half_open(&mut inner);
            if inner.state == CircuitState::Open {
                return Err(ConnectorError::CircuitOpen {
                    connector_id: self.connector_id.clone(),
                });
            }
        }

        let mut current = self.in_flight.load(Ordering::SeqCst);
        loop {
            if current >= self.config.max_concurrent {
                return Err(ConnectorError::TooManyRequests {
                    connector_id: self.connector_id.clone(),
                });
            }
            match self.in_flight.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    fn maybe_half_open(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO);
        if elapsed >= self.config.half_open_after {
            debug!(
                connector_id = %self.connector_id,
                "circuit breaker transitioning to HALF_OPEN"
            );
            inner.state = CircuitState::HalfOpen;
            inner.failures = 0;
            inner.successes = 0;
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match inner.state {
            CircuitState::Closed => {
                inner.failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    debug!(
                        connector_id = %self.connector_id,
                        successes = inner.successes,
                        "circuit breaker transitioning to CLOSED"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    warn!(
                        connector_id = %self.connector_id,
                        failures = inner.failures,
                        "circuit breaker transitioning to OPEN"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    connector_id = %self.connector_id,
                    "circuit breaker re-opening after probe failure"
                );
                inner.state = CircuitState::Open;
                inner.successes = 0;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }
}

/// Counter snapshot for logs and health endpoints.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub in_flight: u32,
}

/// Releases the in-flight slot on every exit path.
struct InFlightGuard {
    in_flight: Arc<AtomicU32>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
