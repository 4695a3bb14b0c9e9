//! Route and backend configuration types.
//!
//! These are the serde-facing shapes loaded from the configuration file; the
//! runtime route table built from them lives in
//! [`crate::utils::route_matcher`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single backend server behind a route.
///
/// `id` is the opaque backend identifier the rest of the decision fabric
/// (balancers, circuit breakers, health checkers) uses to refer to this
/// backend — typically a URL origin such as `http://backend-1:8080`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Backend {
    /// Backend identifier, typically a URL origin.
    pub id: String,

    /// Weight for the smooth weighted round-robin strategy.
    /// Values `<= 0` are normalized to 1 at load time.
    #[serde(default = "default_weight")]
    pub weight: i64,
}

fn default_weight() -> i64 {
    1
}

impl Backend {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("backend id must not be empty".to_string());
        }
        Ok(())
    }

    /// Weight normalized per 4.1: configured weight `<= 0` defaults to 1.
    pub fn normalized_weight(&self) -> i64 {
        if self.weight <= 0 {
            1
        } else {
            self.weight
        }
    }
}

/// Load balancing strategy selectable per route.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Plain round robin over the backend list.
    RoundRobin,
    /// Nginx-style smooth weighted round robin.
    Weighted,
    /// Routes to the backend with the fewest active connections.
    LeastConnections,
    /// Consistent hash ring keyed by a routing key (e.g. client IP).
    ConsistentHash,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

/// A single route definition as it appears in the configuration file.
///
/// Maps to the spec's Route tuple (path-prefix, required-headers,
/// backend-list). `path` is stored with any trailing `/*` or `*` intact;
/// [`RouteConfig::normalized_path`] strips it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RouteConfig {
    /// Path prefix clients match against. Required, non-empty.
    pub path: String,

    /// Headers that must be present (and optionally equal to a specific
    /// value) for this route to match. The sentinel value `"*"` means
    /// "present with any non-empty value".
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Backend pool for this route. Required, non-empty.
    pub backends: Vec<Backend>,

    /// Load balancing strategy for this route's pool.
    #[serde(default)]
    pub strategy: LoadBalancingStrategy,
}

impl RouteConfig {
    /// Strips a trailing `/*` or `*` from `path`, per the spec's path-prefix
    /// definition.
    pub fn normalized_path(&self) -> String {
        let trimmed = self.path.trim_end_matches("/*").trim_end_matches('*');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("route path must not be empty".to_string());
        }
        if self.backends.is_empty() {
            return Err("route must declare at least one backend".to_string());
        }
        for (i, backend) in self.backends.iter().enumerate() {
            backend
                .validate()
                .map_err(|e| format!("backend {} invalid: {}", i, e))?;
        }
        for (name, value) in &self.headers {
            if name.trim().is_empty() {
                return Err("required header name must not be empty".to_string());
            }
            if value != "*" && value.trim().is_empty() {
                return Err(format!(
                    "required header '{}' must have a non-empty value or '*'",
                    name
                ));
            }
        }
        Ok(())
    }
}
