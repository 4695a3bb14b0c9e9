//! Backend selection strategies: round robin, smooth weighted round
//! robin, least connections, and a consistent-hash ring. All four share
//! one contract so a route can swap strategies without touching callers.
//!
//! Balancers are built once from a route's fixed backend list; replacing
//! the backend set means building a new balancer, which is exactly what
//! happens on every hot reload (see [`crate::utils::route_matcher`]).

use crate::models::router::Backend;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Shared contract for backend selection. `next` is given the pool to
/// pick from at call time (typically the healthy-pool's filtered view of
/// this route's backends) and, for strategies that need one, a routing
/// key. Only [`LeastConnectionsBalancer`] gives `done` a real body —
/// callers must still invoke it exactly once per preceding `next()` that
/// returned `Some`, since the trait default is a no-op and leaking the
/// call would otherwise leak a count.
pub trait Balancer: Send + Sync + std::fmt::Debug {
    /// Selects one backend from `candidates`, or `None` if it is empty.
    fn next(&self, candidates: &[String], key: Option<&str>) -> Option<String>;

    /// Must be called exactly once per `next()` that returned `Some`,
    /// success or failure. No-op for strategies that don't track
    /// in-flight counts.
    fn done(&self, _backend: &str) {}
}

/// Plain round robin: a single atomic counter, no other state.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for RoundRobinBalancer {
    fn next(&self, candidates: &[String], _key: Option<&str>) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index].clone())
    }
}

#[derive(Debug)]
struct WrrEntry {
    id: String,
    weight: i64,
    current: i64,
}

/// Nginx-style smooth weighted round robin. Unlike a naive "repeat each
/// backend N times" list, this never produces a run of the heavy backend
/// longer than its weight advantage warrants: weights {A:2, B:1} yield
/// A, B, A, A, B, A, … — never A, A, B, A, A, B.
#[derive(Debug)]
pub struct SmoothWeightedBalancer {
    entries: Mutex<Vec<WrrEntry>>,
}

impl SmoothWeightedBalancer {
    pub fn new(backends: &[Backend]) -> Self {
        let entries = backends
            .iter()
            .map(|b| WrrEntry {
                id: b.id.clone(),
                weight: b.normalized_weight(),
                current: 0,
            })
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl Balancer for SmoothWeightedBalancer {
    fn next(&self, candidates: &[String], _key: Option<&str>) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let wanted: HashSet<&str> = candidates.iter().map(|s| s.as_str()).collect();
        let mut entries = self.entries.lock().unwrap();

        let mut total_weight = 0i64;
        for entry in entries.iter_mut() {
            if wanted.contains(entry.id.as_str()) {
                entry.current += entry.weight;
                total_weight += entry.weight;
            }
        }
        if total_weight == 0 {
            return None;
        }

        // `max_by_key` keeps the *last* max on a tie; the spec requires the
        // lowest index to win, so fold explicitly instead.
        let winner_index = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| wanted.contains(e.id.as_str()))
            .fold(None, |best: Option<(usize, i64)>, (i, e)| match best {
                Some((_, current)) if current >= e.current => best,
                _ => Some((i, e.current)),
            })
            .map(|(i, _)| i)?;

        entries[winner_index].current -= total_weight;
        Some(entries[winner_index].id.clone())
    }
}

/// Each entry carries an atomic in-flight count; `next` picks the
/// lowest, ties broken by the candidate list's own order. `done` must be
/// paired with every `next()` or the count drifts.
#[derive(Debug)]
pub struct LeastConnectionsBalancer {
    counts: std::sync::RwLock<std::collections::HashMap<String, AtomicI64>>,
}

impl LeastConnectionsBalancer {
    pub fn new(backends: &[Backend]) -> Self {
        let mut counts = std::collections::HashMap::new();
        for backend in backends {
            counts.insert(backend.id.clone(), AtomicI64::new(0));
        }
        Self {
            counts: std::sync::RwLock::new(counts),
        }
    }
}

impl Balancer for LeastConnectionsBalancer {
    fn next(&self, candidates: &[String], _key: Option<&str>) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let counts = self.counts.read().unwrap();
        let winner = candidates
            .iter()
            .min_by_key(|id| counts.get(id.as_str()).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0))?;

        if let Some(counter) = counts.get(winner.as_str()) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        Some(winner.clone())
    }

    fn done(&self, backend: &str) {
        if let Some(counter) = self.counts.read().unwrap().get(backend) {
            counter.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

const DEFAULT_REPLICAS: usize = 150;

/// A consistent hash ring keyed by a routing key (typically client IP).
/// Built once from the full backend list at construction; `next` walks
/// the ring forward from the key's hash, skipping any virtual node whose
/// backend isn't in `candidates`, so health filtering doesn't disturb the
/// ring's remap-minimality property.
#[derive(Debug)]
pub struct ConsistentHashBalancer {
    ring: Vec<(u32, String)>,
}

impl ConsistentHashBalancer {
    pub fn new(backends: &[Backend]) -> Self {
        Self::with_replicas(backends, DEFAULT_REPLICAS)
    }

    pub fn with_replicas(backends: &[Backend], replicas: usize) -> Self {
        let replicas = replicas.max(1);
        let mut ring: Vec<(u32, String)> = Vec::with_capacity(backends.len() * replicas);
        for backend in backends {
            for i in 0..replicas {
                let vnode = format!("{}-{}", backend.id, i);
                ring.push((crc32fast::hash(vnode.as_bytes()), backend.id.clone()));
            }
        }
        ring.sort_by_key(|(hash, _)| *hash);
        Self { ring }
    }

    fn hash_key(key: &str) -> u32 {
        crc32fast::hash(key.as_bytes())
    }
}

impl Balancer for ConsistentHashBalancer {
    fn next(&self, candidates: &[String], key: Option<&str>) -> Option<String> {
        if self.ring.is_empty() || candidates.is_empty() {
            return None;
        }
        let wanted: HashSet<&str> = candidates.iter().map(|s| s.as_str()).collect();
        let key = key.unwrap_or("");
        let target = Self::hash_key(key);

        let start = self.ring.partition_point(|(hash, _)| *hash < target);
        for offset in 0..self.ring.len() {
            let index = (start + offset) % self.ring.len();
            let (_, backend) = &self.ring[index];
            if wanted.contains(backend.as_str()) {
                return Some(backend.clone());
            }
        }
        None
    }
}

/// Builds the balancer a route's `strategy` calls for, from its backend
/// list. Used at route-table build time (initial load and every hot
/// reload) — never mutated afterward.
pub fn build_balancer(
    strategy: crate::models::router::LoadBalancingStrategy,
    backends: &[Backend],
) -> std::sync::Arc<dyn Balancer> {
    use crate::models::router::LoadBalancingStrategy::*;
    match strategy {
        RoundRobin => std::sync::Arc::new(RoundRobinBalancer::new()),
        Weighted => std::sync::Arc::new(SmoothWeightedBalancer::new(backends)),
        LeastConnections => std::sync::Arc::new(LeastConnectionsBalancer::new(backends)),
        ConsistentHash => std::sync::Arc::new(ConsistentHashBalancer::new(backends)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(id: &str, weight: i64) -> Backend {
        Backend {
            id: id.to_string(),
            weight,
        }
    }

    fn ids(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn round_robin_distributes_evenly() {
        let rr = RoundRobinBalancer::new();
        let pool = ids(&["a", "b", "c"]);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..30 {
            let pick = rr.next(&pool, None).unwrap();
            *counts.entry(pick).or_insert(0) += 1;
        }
        for backend in &pool {
            assert_eq!(counts[backend], 10);
        }
    }

    #[test]
    fn smooth_weighted_exact_sequence_for_two_to_one() {
        let balancer = SmoothWeightedBalancer::new(&[backend("a", 2), backend("b", 1)]);
        let pool = ids(&["a", "b"]);
        let picks: Vec<String> = (0..6)
            .map(|_| balancer.next(&pool, None).unwrap())
            .collect();
        assert_eq!(picks, vec!["a", "b", "a", "a", "b", "a"]);
    }

    #[test]
    fn smooth_weighted_700_calls_match_exact_distribution() {
        let balancer = SmoothWeightedBalancer::new(&[backend("a", 5), backend("b", 1), backend("c", 1)]);
        let pool = ids(&["a", "b", "c"]);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..700 {
            let pick = balancer.next(&pool, None).unwrap();
            *counts.entry(pick).or_insert(0) += 1;
        }
        assert_eq!(counts["a"], 500);
        assert_eq!(counts["b"], 100);
        assert_eq!(counts["c"], 100);
    }

    #[test]
    fn smooth_weighted_nonpositive_weight_defaults_to_one() {
        let balancer = SmoothWeightedBalancer::new(&[backend("a", 0), backend("b", -5)]);
        let pool = ids(&["a", "b"]);
        let picks: Vec<String> = (0..4)
            .map(|_| balancer.next(&pool, None).unwrap())
            .collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn least_connections_returns_to_zero_after_paired_calls() {
        let balancer = LeastConnectionsBalancer::new(&[backend("a", 1), backend("b", 1)]);
        let pool = ids(&["a", "b"]);
        for _ in 0..20 {
            let picked = balancer.next(&pool, None).unwrap();
            balancer.done(&picked);
        }
        let counts = balancer.counts.read().unwrap();
        for (_, count) in counts.iter() {
            assert_eq!(count.load(Ordering::Relaxed), 0);
        }
    }

    #[test]
    fn least_connections_prefers_lowest_count() {
        let balancer = LeastConnectionsBalancer::new(&[backend("a", 1), backend("b", 1)]);
        let pool = ids(&["a", "b"]);
        let first = balancer.next(&pool, None).unwrap();
        // first is now at count 1; next pick should be the other backend.
        let second = balancer.next(&pool, None).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn consistent_hash_is_deterministic() {
        let balancer = ConsistentHashBalancer::new(&[backend("a", 1), backend("b", 1), backend("c", 1)]);
        let pool = ids(&["a", "b", "c"]);
        let first = balancer.next(&pool, Some("client-42"));
        let second = balancer.next(&pool, Some("client-42"));
        assert_eq!(first, second);
    }

    #[test]
    fn consistent_hash_empty_ring_returns_none() {
        let balancer = ConsistentHashBalancer::new(&[]);
        let pool: Vec<String> = vec![];
        assert_eq!(balancer.next(&pool, Some("k")), None);
    }

    #[test]
    fn consistent_hash_adding_backend_remaps_a_minority_of_keys() {
        let before = ConsistentHashBalancer::new(&[backend("a", 1), backend("b", 1), backend("c", 1)]);
        let after = ConsistentHashBalancer::new(&[
            backend("a", 1),
            backend("b", 1),
            backend("c", 1),
            backend("d", 1),
        ]);
        let pool_before = ids(&["a", "b", "c"]);
        let pool_after = ids(&["a", "b", "c", "d"]);

        let mut remapped = 0;
        for i in 0..1000 {
            let key = format!("key-{}", i);
            let b1 = before.next(&pool_before, Some(&key));
            let b2 = after.next(&pool_after, Some(&key));
            if b1 != b2 {
                remapped += 1;
            }
        }
        assert!(remapped < 500, "remapped {} of 1000 keys", remapped);
    }

    #[test]
    fn filters_to_candidates_skipping_backends_outside_the_pool() {
        let rr = RoundRobinBalancer::new();
        let pool = ids(&["a"]);
        for _ in 0..5 {
            assert_eq!(rr.next(&pool, None).unwrap(), "a");
        }
    }
}
