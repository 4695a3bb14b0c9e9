//! Circuit breaker implementation for upstream service protection.
//!
//! Implements the three-state (Closed/Open/HalfOpen) breaker with a
//! lock-free hot-read state and all transitions serialized by a single
//! mutex, so that the Open → HalfOpen handoff never admits two concurrent
//! probes.

use log::{info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed = 0,
    /// Circuit is open - failing fast
    Open = 1,
    /// Admitting exactly one probe to test recovery
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Configuration parameters for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (in Closed) before the circuit opens.
    pub max_failures: u64,
    /// Time the circuit stays Open before admitting a probe.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct Inner {
    failures: u64,
    last_failure_time: Option<Instant>,
}

/// A single backend's circuit breaker.
///
/// `state` is readable without synchronization; every mutation — including
/// the Open → HalfOpen transition performed inside `allow()` — happens
/// under `inner`, so at most one caller ever observes the transition and
/// receives `true`.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    inner: Mutex<Inner>,
    name: String,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            inner: Mutex::new(Inner {
                failures: 0,
                last_failure_time: None,
            }),
            name,
        })
    }

    /// Lock-free read of the current state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Returns whether a request may proceed, performing the Open →
    /// HalfOpen transition if the timeout has elapsed. The transition and
    /// the `true` return happen atomically under the breaker's lock: the
    /// first caller past `timeout` gets `true` and flips the state; every
    /// other concurrent caller still observes `Open` or the just-entered
    /// `HalfOpen` (which admits nothing further until the probe concludes).
    pub fn allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let mut inner = self.inner.lock().unwrap();
                // re-check under the lock: state may have changed since the
                // lock-free read above.
                if self.state() != CircuitState::Open {
                    return false;
                }
                let elapsed = inner
                    .last_failure_time
                    .map(|t| t.elapsed() >= self.config.timeout)
                    .unwrap_or(false);
                if elapsed {
                    self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
                    info!("circuit breaker {} entering half-open", self.name);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful outcome.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match self.state() {
            CircuitState::Closed => {
                inner.failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.failures = 0;
                self.state.store(CircuitState::Closed as u8, Ordering::Release);
                info!("circuit breaker {} closed - recovered", self.name);
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed outcome.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match self.state() {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.max_failures {
                    inner.last_failure_time = Some(Instant::now());
                    self.state.store(CircuitState::Open as u8, Ordering::Release);
                    warn!(
                        "circuit breaker {} opened after {} failures",
                        self.name, inner.failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.last_failure_time = Some(Instant::now());
                self.state.store(CircuitState::Open as u8, Ordering::Release);
                warn!("circuit breaker {} reopened after failed probe", self.name);
            }
            CircuitState::Open => {
                inner.last_failure_time = Some(Instant::now());
            }
        }
    }

    /// Executes an operation, admitting it only if `allow()` permits, and
    /// records the outcome per the gateway's failure definition (caller
    /// decides what counts as failure via the `Result` it returns).
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if !self.allow() {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        match operation.await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                Err(CircuitBreakerError::OperationFailed(error))
            }
        }
    }

    pub fn failure_count(&self) -> u64 {
        self.inner.lock().unwrap().failures
    }
}

/// Errors produced when calling through a circuit breaker.
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

/// Lazily-populated mapping from backend identifier to its circuit
/// breaker. A request to an unknown backend is admitted — the fresh
/// breaker starts Closed.
#[derive(Debug)]
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    breakers: std::sync::RwLock<std::collections::HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: std::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Returns the breaker for `backend`, creating it lazily on first use.
    pub fn get_or_create(&self, backend: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().unwrap().get(backend) {
            return breaker.clone();
        }
        let mut breakers = self.breakers.write().unwrap();
        breakers
            .entry(backend.to_string())
            .or_insert_with(|| CircuitBreaker::new(backend.to_string(), self.config.clone()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_max_failures() {
        let breaker = CircuitBreaker::new(
            "svc".to_string(),
            CircuitBreakerConfig {
                max_failures: 3,
                timeout: Duration::from_millis(50),
            },
        );

        assert!(breaker.allow());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn half_open_admits_single_probe_then_closes_on_success() {
        let breaker = CircuitBreaker::new(
            "svc".to_string(),
            CircuitBreakerConfig {
                max_failures: 1,
                timeout: Duration::from_millis(10),
            },
        );
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(15));

        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.allow(), "half-open admits only one in-flight probe");

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_reopens_on_failure() {
        let breaker = CircuitBreaker::new(
            "svc".to_string(),
            CircuitBreakerConfig {
                max_failures: 1,
                timeout: Duration::from_millis(10),
            },
        );
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn success_in_closed_resets_failure_count() {
        let breaker = CircuitBreaker::new(
            "svc".to_string(),
            CircuitBreakerConfig {
                max_failures: 3,
                timeout: Duration::from_secs(30),
            },
        );
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn manager_admits_unknown_backend() {
        let manager = CircuitBreakerManager::new(CircuitBreakerConfig::default());
        let breaker = manager.get_or_create("http://fresh-backend");
        assert!(breaker.allow());
    }

    #[tokio::test]
    async fn call_records_outcomes() {
        let breaker = CircuitBreaker::new(
            "svc".to_string(),
            CircuitBreakerConfig {
                max_failures: 1,
                timeout: Duration::from_secs(30),
            },
        );
        let result = breaker.call(async { Ok::<_, String>("ok") }).await;
        assert!(result.is_ok());

        let result = breaker.call(async { Err::<String, _>("boom") }).await;
        assert!(matches!(result, Err(CircuitBreakerError::OperationFailed(_))));
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker.call(async { Ok::<_, String>("ok") }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }
}
