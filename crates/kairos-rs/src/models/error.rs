use actix_web::HttpResponse;
use serde_json::json;

/// Errors surfaced by the decision fabric while handling a request.
///
/// Each variant maps to one of the pipeline stages (routing, rate limiting,
/// circuit breaking, backend selection, forwarding) and to a distinct HTTP
/// status so clients can distinguish "try a different backend" from
/// "stop sending requests for a while".
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no route matches path '{path}'")]
    RouteNotFound { path: String },

    #[error("no healthy backend available for route '{route}'")]
    NoHealthyBackend { route: String },

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("circuit open for backend '{backend}'")]
    CircuitOpen { backend: String },

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl actix_web::error::ResponseError for GatewayError {
    fn error_response(&self) -> HttpResponse {
        let error_message = self.to_string();
        match self {
            GatewayError::RouteNotFound { .. } => HttpResponse::NotFound().json(json!({
                "error": error_message,
                "type": "route_not_found"
            })),
            GatewayError::NoHealthyBackend { .. } => {
                HttpResponse::ServiceUnavailable().json(json!({
                    "error": error_message,
                    "type": "no_healthy_backend"
                }))
            }
            GatewayError::RateLimited => HttpResponse::TooManyRequests().json(json!({
                "error": error_message,
                "type": "rate_limited"
            })),
            GatewayError::CircuitOpen { .. } => HttpResponse::ServiceUnavailable().json(json!({
                "error": error_message,
                "type": "circuit_open"
            })),
            GatewayError::Timeout => HttpResponse::GatewayTimeout().json(json!({
                "error": error_message,
                "type": "timeout"
            })),
            GatewayError::Upstream(_) => HttpResponse::BadGateway().json(json!({
                "error": error_message,
                "type": "upstream"
            })),
            GatewayError::Config(_) => HttpResponse::InternalServerError().json(json!({
                "error": error_message,
                "type": "config"
            })),
            GatewayError::Internal(_) => HttpResponse::InternalServerError().json(json!({
                "error": error_message,
                "type": "internal"
            })),
        }
    }
}
