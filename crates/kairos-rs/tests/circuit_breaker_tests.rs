use kairos_rs::services::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerManager, CircuitState,
};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn stays_closed_through_successes() {
    let cb = CircuitBreaker::new(
        "svc".to_string(),
        CircuitBreakerConfig {
            max_failures: 3,
            timeout: Duration::from_secs(1),
        },
    );

    let result = cb.call(async { Ok::<i32, &str>(42) }).await;
    assert!(result.is_ok());
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test]
async fn opens_after_max_failures_and_fails_fast() {
    let cb = CircuitBreaker::new(
        "svc".to_string(),
        CircuitBreakerConfig {
            max_failures: 2,
            timeout: Duration::from_secs(1),
        },
    );

    assert!(cb.call(async { Err::<i32, &str>("boom") }).await.is_err());
    assert_eq!(cb.state(), CircuitState::Closed);

    assert!(cb.call(async { Err::<i32, &str>("boom") }).await.is_err());
    assert_eq!(cb.state(), CircuitState::Open);

    let result = cb.call(async { Ok::<i32, &str>(42) }).await;
    assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
}

#[tokio::test]
async fn half_open_probe_recovers_to_closed() {
    let cb = CircuitBreaker::new(
        "svc".to_string(),
        CircuitBreakerConfig {
            max_failures: 1,
            timeout: Duration::from_millis(50),
        },
    );

    let _ = cb.call(async { Err::<i32, &str>("boom") }).await;
    assert_eq!(cb.state(), CircuitState::Open);

    sleep(Duration::from_millis(80)).await;

    let result = cb.call(async { Ok::<i32, &str>(42) }).await;
    assert!(result.is_ok());
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[test]
fn manager_creates_independent_breakers_per_backend() {
    let manager = CircuitBreakerManager::new(CircuitBreakerConfig {
        max_failures: 1,
        timeout: Duration::from_secs(30),
    });

    let a = manager.get_or_create("http://a");
    a.record_failure();
    assert_eq!(a.state(), CircuitState::Open);

    let b = manager.get_or_create("http://b");
    assert_eq!(b.state(), CircuitState::Closed);
}
