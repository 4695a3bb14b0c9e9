use kairos_rs::models::router::{Backend, LoadBalancingStrategy, RouteConfig};
use kairos_rs::services::health::{CombinedChecker, HealthConfig};
use kairos_rs::utils::route_matcher::RouteTable;
use std::collections::HashMap;

fn route(path: &str, headers: &[(&str, &str)], backend_ids: &[&str]) -> RouteConfig {
    RouteConfig {
        path: path.to_string(),
        headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        backends: backend_ids
            .iter()
            .map(|id| Backend {
                id: id.to_string(),
                weight: 1,
            })
            .collect(),
        strategy: LoadBalancingStrategy::RoundRobin,
    }
}

fn checker() -> std::sync::Arc<CombinedChecker> {
    CombinedChecker::new(std::iter::empty(), HealthConfig::default())
}

#[test]
fn builds_a_table_and_matches_the_most_specific_route() {
    let routes = vec![
        route("/api", &[], &["http://generic:8080"]),
        route("/api/payments", &[], &["http://payments:8080"]),
    ];
    let table = RouteTable::build(&routes, &checker());

    let matched = table.find("/api/payments/charge", |_| None).unwrap();
    assert_eq!(matched.path, "/api/payments");
    assert_eq!(matched.backends, vec!["http://payments:8080".to_string()]);
}

#[test]
fn a_route_requiring_a_header_is_skipped_without_it() {
    let routes = vec![route(
        "/admin",
        &[("x-admin-token", "*")],
        &["http://admin:8080"],
    )];
    let table = RouteTable::build(&routes, &checker());

    assert!(table.find("/admin", |_| None).is_none());

    let mut present = HashMap::new();
    present.insert("x-admin-token".to_string(), "secret".to_string());
    assert!(table
        .find("/admin", |name| present.get(name).cloned())
        .is_some());
}

#[test]
fn each_compiled_route_gets_its_own_balancer_and_pool() {
    let routes = vec![
        route("/a", &[], &["http://a:8080"]),
        route("/b", &[], &["http://b:8080"]),
    ];
    let table = RouteTable::build(&routes, &checker());

    let a = table.find("/a", |_| None).unwrap();
    let b = table.find("/b", |_| None).unwrap();
    assert_eq!(a.healthy_pool.healthy(), vec!["http://a:8080".to_string()]);
    assert_eq!(b.healthy_pool.healthy(), vec!["http://b:8080".to_string()]);
}
