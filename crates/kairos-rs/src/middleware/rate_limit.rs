//! Per-client rate limiting: token bucket and sliding window counter,
//! both backed by a lazily-populated, swept client map.

use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error as ActixError,
};
use futures::future::{LocalBoxFuture, Ready};
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    sync::{Arc, Mutex, RwLock},
    task::{Context, Poll},
    time::{Duration, Instant},
};

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

fn millis_since_start(instant: Instant) -> u64 {
    instant.saturating_duration_since(*PROCESS_START).as_millis() as u64
}

/// Outcome of a rate limit check: whether the request is allowed, and if
/// not, how long the caller should wait before retrying.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub retry_after: Duration,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }
}

/// Token bucket: tokens refill lazily on every `allow()` call, never via a
/// background ticker.
#[derive(Debug, Clone)]
struct TokenBucket {
    capacity: f64,
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, rate: f64) -> Self {
        Self {
            capacity,
            rate,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// The four-step lazy refill: elapsed, refill capped at capacity,
    /// stamp, then spend one token or report the wait.
    fn allow(&mut self, now: Instant) -> Decision {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Decision::allow()
        } else if self.rate > 0.0 {
            let wait = (1.0 - self.tokens) / self.rate;
            Decision::deny(Duration::from_secs_f64(wait.max(0.0)))
        } else {
            Decision::deny(Duration::from_secs(u64::MAX / 2))
        }
    }
}

/// Sliding window counter: prev/curr buckets with linear interpolation,
/// approximating a true sliding window in O(1) memory.
#[derive(Debug, Clone)]
struct SlidingWindow {
    window_start: Instant,
    prev_count: u64,
    curr_count: u64,
    max_requests: u64,
    window_size: Duration,
}

impl SlidingWindow {
    fn new(max_requests: u64, window_size: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            prev_count: 0,
            curr_count: 0,
            max_requests,
            window_size,
        }
    }

    fn allow(&mut self, now: Instant) -> Decision {
        let mut elapsed = now.saturating_duration_since(self.window_start);

        if elapsed >= self.window_size * 2 {
            self.prev_count = 0;
            self.curr_count = 0;
            self.window_start = now;
            elapsed = Duration::ZERO;
        } else if elapsed >= self.window_size {
            self.prev_count = self.curr_count;
            self.curr_count = 0;
            self.window_start += self.window_size;
            elapsed = now.saturating_duration_since(self.window_start);
        }

        let window_secs = self.window_size.as_secs_f64();
        let weight = if window_secs > 0.0 {
            (1.0 - elapsed.as_secs_f64() / window_secs).max(0.0)
        } else {
            0.0
        };
        let effective = self.prev_count as f64 * weight + self.curr_count as f64;

        if effective + 1.0 > self.max_requests as f64 {
            Decision::deny(self.window_size.saturating_sub(elapsed))
        } else {
            self.curr_count += 1;
            Decision::allow()
        }
    }
}

#[derive(Debug, Clone)]
enum ClientLimiterState {
    TokenBucket(TokenBucket),
    SlidingWindow(SlidingWindow),
}

impl ClientLimiterState {
    fn allow(&mut self, now: Instant) -> Decision {
        match self {
            ClientLimiterState::TokenBucket(b) => b.allow(now),
            ClientLimiterState::SlidingWindow(w) => w.allow(now),
        }
    }
}

/// Selects which algorithm backs every per-client entry in a [`RateLimiter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RateLimitAlgorithm {
    TokenBucket { capacity: f64, rate: f64 },
    SlidingWindow {
        max_requests: u64,
        #[serde(with = "duration_serde")]
        window_size: Duration,
    },
}

impl RateLimitAlgorithm {
    fn new_state(&self) -> ClientLimiterState {
        match self {
            RateLimitAlgorithm::TokenBucket { capacity, rate } => {
                ClientLimiterState::TokenBucket(TokenBucket::new(*capacity, *rate))
            }
            RateLimitAlgorithm::SlidingWindow {
                max_requests,
                window_size,
            } => ClientLimiterState::SlidingWindow(SlidingWindow::new(*max_requests, *window_size)),
        }
    }
}

/// Rate limiting configuration loaded from the gateway configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub algorithm: RateLimitAlgorithm,
    /// Per-client entries idle longer than this are evicted by the sweeper.
    #[serde(with = "duration_serde")]
    pub stale_threshold: Duration,
}

struct ClientEntry {
    state: Mutex<ClientLimiterState>,
    last_access_millis: AtomicU64,
}

/// A per-client rate limiter backed by a lazily-populated map.
///
/// Entries are created on first request from a key and evicted by a
/// background sweeper once idle for longer than `stale_threshold`. The
/// sweeper is the only mechanism bounding memory; callers should spawn it
/// with [`RateLimiter::spawn_sweeper`].
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: RwLock<HashMap<String, Arc<ClientEntry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            clients: RwLock::new(HashMap::new()),
        })
    }

    /// Checks and updates the per-client state for `key`.
    pub fn allow(&self, key: &str) -> Decision {
        let now = Instant::now();

        // fast path: shared lock
        if let Some(entry) = self.clients.read().unwrap().get(key) {
            entry
                .last_access_millis
                .store(millis_since_start(now), Ordering::Relaxed);
            return entry.state.lock().unwrap().allow(now);
        }

        // slow path: exclusive lock, re-check, install
        let mut clients = self.clients.write().unwrap();
        let entry = clients.entry(key.to_string()).or_insert_with(|| {
            Arc::new(ClientEntry {
                state: Mutex::new(self.config.algorithm.new_state()),
                last_access_millis: AtomicU64::new(millis_since_start(now)),
            })
        });
        entry
            .last_access_millis
            .store(millis_since_start(now), Ordering::Relaxed);
        entry.state.lock().unwrap().allow(now)
    }

    /// Removes any client entry idle longer than `stale_threshold`. Intended
    /// to run on a period of `stale_threshold / 2`.
    pub fn sweep(&self) {
        let now_millis = millis_since_start(Instant::now());
        let threshold_millis = self.config.stale_threshold.as_millis() as u64;
        let mut clients = self.clients.write().unwrap();
        let before = clients.len();
        clients.retain(|_, entry| {
            now_millis.saturating_sub(entry.last_access_millis.load(Ordering::Relaxed))
                < threshold_millis
        });
        let removed = before - clients.len();
        if removed > 0 {
            debug!("rate limiter sweep removed {} stale client(s)", removed);
        }
    }

    /// Spawns the background sweeper on a period of `stale_threshold / 2`.
    /// Runs until the returned handle is dropped or aborted.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = self.config.stale_threshold / 2;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}

/// Actix middleware applying a [`RateLimiter`] keyed by client IP.
#[derive(Clone)]
pub struct RateLimitMiddlewareFactory {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddlewareFactory {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        futures::future::ready(Ok(RateLimitMiddleware {
            service: Arc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Arc<S>,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();

        let key = req
            .connection_info()
            .peer_addr()
            .unwrap_or("unknown")
            .to_string();

        Box::pin(async move {
            let decision = limiter.allow(&key);
            if decision.allowed {
                service.call(req).await
            } else {
                warn!("rate limit exceeded for client {}", key);
                let retry_after_secs = decision.retry_after.as_secs_f64().round() as u64;
                let response = actix_web::HttpResponse::TooManyRequests()
                    .insert_header(("Retry-After", retry_after_secs.to_string()))
                    .json(serde_json::json!({
                        "error": "rate limit exceeded",
                        "retry_after_secs": retry_after_secs,
                        "type": "rate_limited"
                    }));
                Err(actix_web::error::InternalError::from_response(
                    "rate limit exceeded",
                    response,
                )
                .into())
            }
        })
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
