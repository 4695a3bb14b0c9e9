//! The forwarder and the request pipeline that ties the rest of the
//! decision fabric together: match a route, filter to healthy backends,
//! pick one, ask its circuit breaker, forward, and record the outcome.
//!
//! Raw byte forwarding is intentionally simple — this crate's job is the
//! admission decision, not a full-featured reverse proxy (no request/response
//! transformation, no retries, no WebSocket upgrade).

use crate::models::error::GatewayError;
use crate::services::circuit_breaker::CircuitBreakerManager;
use crate::services::health::CombinedChecker;
use crate::utils::path::format_route;
use crate::utils::route_matcher::RouteTable;
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::{web, HttpRequest, HttpResponse};
use arc_swap::ArcSwap;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Headers that are meaningful only for one hop and must never be copied
/// across the proxy boundary in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str())
}

/// Portion of `request_path` beyond the matched route's prefix, preserving
/// a leading slash. An exact match forwards `/`.
fn remainder_path<'a>(route_path: &str, request_path: &'a str) -> &'a str {
    if route_path == "/" {
        return request_path;
    }
    match request_path.strip_prefix(route_path) {
        Some(rest) if rest.is_empty() => "/",
        Some(rest) => rest,
        None => request_path,
    }
}

/// Ties the decision fabric's stages together for one inbound request.
/// Cloning is cheap: every field is an `Arc` or a `reqwest::Client`
/// (itself `Arc`-backed internally), so a clone can be moved into each
/// request's async handler closure.
#[derive(Clone)]
pub struct RouteHandler {
    routes: Arc<ArcSwap<RouteTable>>,
    checker: Arc<CombinedChecker>,
    circuits: Arc<CircuitBreakerManager>,
    client: reqwest::Client,
    upstream_timeout: Duration,
}

impl RouteHandler {
    pub fn new(
        routes: Arc<ArcSwap<RouteTable>>,
        checker: Arc<CombinedChecker>,
        circuits: Arc<CircuitBreakerManager>,
        client: reqwest::Client,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            routes,
            checker,
            circuits,
            client,
            upstream_timeout,
        }
    }

    pub async fn handle_request(
        &self,
        req: HttpRequest,
        body: web::Bytes,
    ) -> Result<HttpResponse, GatewayError> {
        let table = self.routes.load();
        let request_path = req.path().to_string();

        let route = table
            .find(&request_path, |name| {
                req.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
            })
            .ok_or_else(|| GatewayError::RouteNotFound {
                path: request_path.clone(),
            })?;

        let candidates = route.healthy_pool.healthy();
        let client_key = req.connection_info().peer_addr().map(|s| s.to_string());

        let backend = route
            .balancer
            .next(&candidates, client_key.as_deref())
            .ok_or_else(|| GatewayError::NoHealthyBackend {
                route: route.path.clone(),
            })?;

        let circuit = self.circuits.get_or_create(&backend);
        if !circuit.allow() {
            route.balancer.done(&backend);
            return Err(GatewayError::CircuitOpen { backend });
        }

        let path = remainder_path(&route.path, &request_path);
        let query = req.query_string();
        let target = if query.is_empty() {
            format_route(&backend, path)
        } else {
            format!("{}?{}", format_route(&backend, path), query)
        };

        let outcome = self.forward(&req, body, &target).await;
        route.balancer.done(&backend);

        match outcome {
            Ok(response) => {
                // A response that completed the round trip is still a
                // failure for the decision fabric's purposes if the
                // backend returned >= 500 (spec §4.3 / §7): the client
                // still sees the upstream's response, but the circuit
                // breaker and passive checker must see it as a failure.
                if response.status().as_u16() >= 500 {
                    circuit.record_failure();
                    self.checker.record_failure(&backend);
                    warn!(
                        "forwarding to {} returned {}",
                        target,
                        response.status()
                    );
                } else {
                    circuit.record_success();
                    self.checker.record_success(&backend);
                }
                Ok(response)
            }
            Err(err) => {
                circuit.record_failure();
                self.checker.record_failure(&backend);
                warn!("forwarding to {} failed: {}", target, err);
                Err(err)
            }
        }
    }

    async fn forward(
        &self,
        req: &HttpRequest,
        body: web::Bytes,
        target: &str,
    ) -> Result<HttpResponse, GatewayError> {
        let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
            .map_err(|_| GatewayError::Internal("unsupported HTTP method".to_string()))?;

        let mut builder = self
            .client
            .request(method, target)
            .timeout(self.upstream_timeout)
            .body(body.to_vec());

        for (name, value) in req.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        debug!("forwarding {} {} -> {}", req.method(), req.path(), target);

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Upstream(e.to_string())
            }
        })?;

        let status = actix_web::http::StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);

        let mut out = HttpResponse::build(status);
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.insert(name, value);
            }
        }
        for (name, value) in headers.iter() {
            out.insert_header((name.clone(), value.clone()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        Ok(out.body(bytes))
    }
}
