use kairos_rs::services::health::{CombinedChecker, HealthConfig, HealthyPool};

fn config() -> HealthConfig {
    HealthConfig {
        healthy_threshold: 2,
        unhealthy_threshold: 2,
        passive_min_requests: 3,
        passive_error_threshold: 0.5,
        ..HealthConfig::default()
    }
}

#[tokio::test]
async fn passive_failures_alone_can_mark_a_backend_unhealthy() {
    let checker = CombinedChecker::new(vec!["http://a".to_string()], config());
    assert!(checker.is_healthy("http://a"));

    checker.record_failure("http://a");
    checker.record_failure("http://a");
    checker.record_failure("http://a");
    assert!(!checker.is_healthy("http://a"));

    // recovers once enough successes dilute the window below threshold
    for _ in 0..10 {
        checker.record_success("http://a");
    }
    assert!(checker.is_healthy("http://a"));
}

#[test]
fn healthy_pool_scoped_to_a_route_ignores_other_routes_backends() {
    let checker = CombinedChecker::new(
        vec!["http://a".to_string(), "http://b".to_string()],
        config(),
    );
    let pool = HealthyPool::new(vec!["http://a".to_string()], checker);

    assert_eq!(pool.healthy(), vec!["http://a".to_string()]);
}

#[test]
fn removing_a_backend_from_the_pool_stops_it_being_offered() {
    let checker = CombinedChecker::new(vec!["http://a".to_string()], config());
    let pool = HealthyPool::new(vec!["http://a".to_string()], checker);

    pool.add_backend("http://b");
    assert_eq!(pool.healthy().len(), 2);

    pool.remove_backend("http://a");
    assert_eq!(pool.healthy(), vec!["http://b".to_string()]);
}
