use kairos_rs::middleware::rate_limit::{RateLimitAlgorithm, RateLimitConfig, RateLimiter};
use std::time::Duration;

#[test]
fn token_bucket_admits_up_to_capacity_then_denies() {
    let limiter = RateLimiter::new(RateLimitConfig {
        algorithm: RateLimitAlgorithm::TokenBucket {
            capacity: 3.0,
            rate: 0.001,
        },
        stale_threshold: Duration::from_secs(60),
    });

    for _ in 0..3 {
        assert!(limiter.allow("client-a").allowed);
    }
    let decision = limiter.allow("client-a");
    assert!(!decision.allowed);
    assert!(decision.retry_after > Duration::ZERO);
}

#[test]
fn clients_are_tracked_independently() {
    let limiter = RateLimiter::new(RateLimitConfig {
        algorithm: RateLimitAlgorithm::TokenBucket {
            capacity: 1.0,
            rate: 0.001,
        },
        stale_threshold: Duration::from_secs(60),
    });

    assert!(limiter.allow("client-a").allowed);
    assert!(!limiter.allow("client-a").allowed);
    assert!(limiter.allow("client-b").allowed, "a separate client has its own bucket");
}

#[test]
fn sliding_window_denies_once_max_requests_is_reached() {
    let limiter = RateLimiter::new(RateLimitConfig {
        algorithm: RateLimitAlgorithm::SlidingWindow {
            max_requests: 2,
            window_size: Duration::from_secs(60),
        },
        stale_threshold: Duration::from_secs(120),
    });

    assert!(limiter.allow("client-a").allowed);
    assert!(limiter.allow("client-a").allowed);
    assert!(!limiter.allow("client-a").allowed);
}
