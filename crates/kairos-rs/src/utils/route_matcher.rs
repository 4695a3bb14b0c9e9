//! Compiles [`RouteConfig`] entries into a [`RouteTable`]: a list sorted
//! by specificity so the first prefix-and-header match wins, each entry
//! carrying its own constructed balancer.
//!
//! A table is built once per configuration load (initial load or hot
//! reload) and never mutated; reloading means building a new table and
//! swapping it in, see [`crate::config::hot_reload`].

use crate::models::router::RouteConfig;
use crate::services::health::{CombinedChecker, HealthyPool};
use crate::services::load_balancer::{build_balancer, Balancer};
use std::collections::HashMap;
use std::sync::Arc;

/// One route, compiled: its match criteria plus the balancer built from
/// its backend list.
#[derive(Debug)]
pub struct CompiledRoute {
    /// Normalized path prefix, e.g. `/api/users`.
    pub path: String,

    /// Required headers; name is case-insensitive, value `"*"` matches
    /// any non-empty value.
    pub headers: HashMap<String, String>,

    /// Backend identifiers in configuration order, for the healthy pool
    /// to filter against.
    pub backends: Vec<String>,

    /// Balancer built from this route's backend list at compile time.
    pub balancer: Arc<dyn Balancer>,

    /// This route's view of the shared [`CombinedChecker`], scoped to its
    /// own backend list.
    pub healthy_pool: Arc<HealthyPool>,
}

impl CompiledRoute {
    fn specificity(&self) -> (usize, usize) {
        (self.path.len(), self.headers.len())
    }

    fn matches_path(&self, request_path: &str) -> bool {
        if self.path == "/" {
            return true;
        }
        request_path == self.path
            || request_path
                .strip_prefix(self.path.as_str())
                .map(|rest| rest.is_empty() || rest.starts_with('/'))
                .unwrap_or(false)
    }

    fn matches_headers(&self, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
        self.headers.iter().all(|(name, expected)| match lookup(name) {
            Some(actual) => {
                if expected == "*" {
                    !actual.is_empty()
                } else {
                    &actual == expected
                }
            }
            None => false,
        })
    }
}

fn compile(config: &RouteConfig, checker: &Arc<CombinedChecker>) -> CompiledRoute {
    let backends: Vec<String> = config.backends.iter().map(|b| b.id.clone()).collect();
    let headers = config
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect();
    CompiledRoute {
        path: config.normalized_path(),
        headers,
        balancer: build_balancer(config.strategy, &config.backends),
        healthy_pool: Arc::new(HealthyPool::new(backends.clone(), checker.clone())),
        backends,
    }
}

/// An immutable, specificity-sorted set of compiled routes.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Builds a table from validated configuration. Callers should run
    /// [`crate::models::settings::Settings::validate`] first; this does
    /// not re-validate, only compiles. `checker` is the single
    /// [`CombinedChecker`] shared across the whole gateway; every
    /// compiled route's healthy pool borrows it.
    pub fn build(routes: &[RouteConfig], checker: &Arc<CombinedChecker>) -> Self {
        let mut compiled: Vec<CompiledRoute> = routes.iter().map(|r| compile(r, checker)).collect();
        compiled.sort_by(|a, b| b.specificity().cmp(&a.specificity()));
        Self { routes: compiled }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Finds the most specific route whose path prefix and required
    /// headers both match. `header_lookup` should do a case-insensitive
    /// lookup; header names in the compiled table are already lowercased.
    pub fn find(
        &self,
        request_path: &str,
        header_lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<&CompiledRoute> {
        self.routes
            .iter()
            .find(|route| route.matches_path(request_path) && route.matches_headers(&header_lookup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::router::{Backend, LoadBalancingStrategy};

    fn route(path: &str, headers: &[(&str, &str)]) -> RouteConfig {
        RouteConfig {
            path: path.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            backends: vec![Backend {
                id: "http://backend:8080".to_string(),
                weight: 1,
            }],
            strategy: LoadBalancingStrategy::RoundRobin,
        }
    }

    fn no_headers(_: &str) -> Option<String> {
        None
    }

    fn checker() -> Arc<CombinedChecker> {
        CombinedChecker::new(std::iter::empty(), crate::services::health::HealthConfig::default())
    }

    #[test]
    fn longest_prefix_wins_over_shorter() {
        let table = RouteTable::build(&[route("/api", &[]), route("/api/users", &[])], &checker());
        let matched = table.find("/api/users/42", no_headers).unwrap();
        assert_eq!(matched.path, "/api/users");
    }

    #[test]
    fn root_path_matches_everything() {
        let table = RouteTable::build(&[route("/", &[])], &checker());
        assert!(table.find("/anything/at/all", no_headers).is_some());
    }

    #[test]
    fn segment_boundary_is_respected() {
        let table = RouteTable::build(&[route("/api", &[])], &checker());
        assert!(table.find("/apiextra", no_headers).is_none());
        assert!(table.find("/api/extra", no_headers).is_some());
        assert!(table.find("/api", no_headers).is_some());
    }

    #[test]
    fn required_header_must_be_present_with_matching_value() {
        let table = RouteTable::build(&[route("/api", &[("x-tenant", "acme")])], &checker());
        assert!(table.find("/api", no_headers).is_none());
        assert!(table
            .find("/api", |name| if name == "x-tenant" {
                Some("acme".to_string())
            } else {
                None
            })
            .is_some());
        assert!(table
            .find("/api", |name| if name == "x-tenant" {
                Some("other".to_string())
            } else {
                None
            })
            .is_none());
    }

    #[test]
    fn wildcard_header_value_matches_any_non_empty_value() {
        let table = RouteTable::build(&[route("/api", &[("x-tenant", "*")])], &checker());
        assert!(table
            .find("/api", |name| if name == "x-tenant" {
                Some("anything".to_string())
            } else {
                None
            })
            .is_some());
    }

    #[test]
    fn wildcard_header_value_rejects_empty_string() {
        let table = RouteTable::build(&[route("/api", &[("x-tenant", "*")])], &checker());
        assert!(table
            .find("/api", |name| if name == "x-tenant" {
                Some(String::new())
            } else {
                None
            })
            .is_none());
    }

    #[test]
    fn more_headers_wins_tie_on_path_length() {
        let table = RouteTable::build(&[route("/api", &[]), route("/api", &[("x-tenant", "*")])], &checker());
        let matched = table
            .find("/api", |name| if name == "x-tenant" {
                Some("acme".to_string())
            } else {
                None
            })
            .unwrap();
        assert_eq!(matched.headers.len(), 1);
    }
}
